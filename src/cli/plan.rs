use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use sv4d_burn::schedule::{SamplingPlan, TraversalPolicy};

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum Traversal {
    Alternating,
    Forward,
}

impl From<Traversal> for TraversalPolicy {
    fn from(value: Traversal) -> Self {
        match value {
            Traversal::Alternating => TraversalPolicy::Alternating,
            Traversal::Forward => TraversalPolicy::Forward,
        }
    }
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[arg(long, default_value_t = 21)]
    pub n_frames: usize,

    /// Grid views, including the input view.
    #[arg(long, default_value_t = 9)]
    pub n_views: usize,

    #[arg(long, default_value_t = 5)]
    pub frames_per_call: usize,

    #[arg(long, default_value_t = 20)]
    pub num_steps: usize,

    #[arg(long, value_enum, default_value = "alternating")]
    pub traversal: Traversal,
}

/// Human readable schedule of a run.
pub fn render_plan(args: &PlanArgs) -> Result<String> {
    let plan = SamplingPlan::new(args.n_frames, args.n_views, args.frames_per_call)
        .context("invalid grid geometry")?;
    let traversal = TraversalPolicy::from(args.traversal);

    let mut out = String::new();
    out.push_str(&format!(
        "grid: {} frames x {} views, {} frames per call\n",
        args.n_frames, args.n_views, args.frames_per_call
    ));

    out.push_str("anchor pass:\n");
    for window in &plan.anchor {
        out.push_str(&format!(
            "  reference {:>3} -> frames {:?}\n",
            window.reference_frame, window.frames
        ));
    }

    out.push_str("dense pass:\n");
    for window in &plan.dense {
        out.push_str(&format!("  window at {:>3}:\n", window.start));
        for step in 0..args.num_steps {
            let order = traversal.order(&window.frames, step);
            out.push_str(&format!(
                "    step {step:>3}: reference {:>3}, order {order:?}\n",
                order[0]
            ));
        }
    }

    out.push_str(&format!("diagonal views: {:?}\n", plan.diagonal));
    Ok(out)
}

pub fn handle_plan(args: &PlanArgs) -> Result<()> {
    print!("{}", render_plan(args)?);
    Ok(())
}
