use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use flexi_logger::Logger;
use log::{info, warn};
use mcsc_planner::config::FrameDescription;
use mcsc_planner::planning::plan_stripes;
use mcsc_planner::render::{load_rgba, render_frame, save_png};
use mcsc_scale::caps::HwVariant;

/// Plan the scaler configuration of one frame and optionally preview it on an image.
#[derive(Parser, Debug)]
#[command(name = "mcsc-plan")]
#[command(about = "Plan multi-channel scaler configurations")]
#[command(long_about = "Reads a JSON frame description, plans every stripe of the frame and prints the
resulting port configurations as JSON. With --render the plan is also applied to an image
and one PNG per output is written.")]
struct Args {
    /// Frame description (JSON)
    frame: PathBuf,

    /// Use a reference hardware table instead of the one in the frame description
    #[arg(long, value_enum)]
    variant: Option<HwVariant>,

    /// Pass every crop through unscaled
    #[arg(long)]
    bypass: bool,

    /// Log the first stripe's plan as JSON
    #[arg(long)]
    dump: bool,

    /// Round poly destinations to the output aspect
    #[arg(long)]
    post_quality: bool,

    /// Input image to render the plan on
    #[arg(long, requires = "out_dir")]
    render: Option<PathBuf>,

    /// Directory for rendered outputs
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    Logger::try_with_env_or_str(level)
        .context("invalid log specification")?
        .start()
        .context("logger initialization failed")?;

    let mut frame = FrameDescription::load(&args.frame)?;
    if let Some(variant) = args.variant {
        frame.capabilities = None;
        frame.variant = Some(variant);
    }
    frame.config.bypass |= args.bypass;
    frame.config.dump_once |= args.dump;
    frame.config.post_quality_workaround |= args.post_quality;
    frame.validate()?;

    let caps = frame.capability_table();
    let outputs = frame.requests(&caps);
    let mut stripe = frame.stripe_context();
    let config = frame.config;

    let plans = match &args.render {
        Some(input_path) => {
            let Some(out_dir) = &args.out_dir else {
                bail!("--render needs --out-dir");
            };
            let input = load_rgba(input_path)?;
            std::fs::create_dir_all(out_dir)
                .with_context(|| format!("creating {}", out_dir.display()))?;
            let rendered = render_frame(&input, &caps, &outputs, &mut stripe, &config, frame.tuning())?;
            for output in &rendered.outputs {
                save_png(&output.image, &out_dir.join(format!("output_{}.png", output.logical)))?;
            }
            rendered.plans
        }
        None => plan_stripes(&caps, &outputs, &mut stripe, &config, frame.tuning())?,
    };

    let degraded = plans.iter().filter(|p| p.degraded).count();
    if degraded > 0 {
        warn!("{degraded} of {} stripe plans are degraded", plans.len());
    }
    info!("planned {} stripe(s) for {} outputs", plans.len(), caps.channel_count());
    println!("{}", serde_json::to_string_pretty(&plans)?);
    Ok(())
}
