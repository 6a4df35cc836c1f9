#![forbid(unsafe_code)]

//! Runs startup mode selection against the simulated VBE firmware.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use svga_firmware::{FaultPlan, SimDpmi};
use svga_vbe::{
    get_controller_info, reset_mode, vbe_get_mode_info, ActiveMode, FixedMode, StartMode,
    StartModeSelector, StartOutcome, SvgaConfig,
};

#[derive(Debug, Parser)]
#[command(about = "Probe VESA mode selection against a simulated adapter")]
struct Args {
    /// JSON video settings (missing file means defaults).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use this VBE mode number instead of auto-detection (hex, e.g. 101).
    #[arg(long, value_parser = parse_hex_u16, requires = "width")]
    mode: Option<u16>,

    #[arg(long, requires = "height")]
    width: Option<u16>,

    #[arg(long)]
    height: Option<u16>,

    /// Draw to a half-resolution surface.
    #[arg(long, requires = "mode")]
    half: bool,

    #[arg(long)]
    max_width: Option<u16>,

    #[arg(long)]
    max_height: Option<u16>,

    /// Try the banked window before the linear framebuffer.
    #[arg(long)]
    banked: bool,

    /// Do not fall back to VGA mode 13h.
    #[arg(long)]
    no_legacy: bool,

    /// Linear base of the caller's data segment (hex).
    #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
    ds_base: u32,

    /// Print the adapter's mode list before selecting.
    #[arg(long)]
    list: bool,

    /// Leave the selected mode set instead of restoring text mode.
    #[arg(long)]
    keep_mode: bool,

    /// Simulate a host without real-mode call support.
    #[arg(long)]
    unavailable: bool,

    /// Simulate a host that refuses to dispatch real-mode calls.
    #[arg(long)]
    host_rejects: bool,

    /// Simulate firmware that rejects every function.
    #[arg(long)]
    reject_all: bool,

    /// Simulate firmware that refuses to set modes.
    #[arg(long)]
    reject_set_mode: bool,

    /// Simulate a host without address translation.
    #[arg(long)]
    no_translation: bool,

    /// Simulate a host that cannot map the linear framebuffer.
    #[arg(long)]
    no_fb_mapping: bool,

    /// Simulate firmware that describes every mode as unsupported.
    #[arg(long)]
    unsupported_modes: bool,

    /// Simulate a controller info block without the VESA signature.
    #[arg(long)]
    bad_vesa_signature: bool,

    /// Simulate a controller info block with a null mode list.
    #[arg(long)]
    null_mode_list: bool,

    /// Simulate an adapter without a linear framebuffer.
    #[arg(long)]
    no_lfb: bool,
}

impl Args {
    fn faults(&self) -> FaultPlan {
        FaultPlan {
            unavailable: self.unavailable,
            host_rejects: self.host_rejects,
            reject_all: self.reject_all,
            reject_set_mode: self.reject_set_mode,
            no_translation: self.no_translation,
            no_physical_mapping: self.no_fb_mapping,
            unsupported_modes: self.unsupported_modes,
            bad_controller_signature: self.bad_vesa_signature,
            null_mode_list: self.null_mode_list,
            no_linear_framebuffer: self.no_lfb,
        }
    }

    fn config(&self) -> Result<SvgaConfig> {
        let mut config = match &self.config {
            Some(path) => SvgaConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => SvgaConfig::default(),
        };
        if let (Some(mode), Some(width), Some(height)) = (self.mode, self.width, self.height) {
            config.start_mode = StartMode::Fixed(FixedMode {
                mode,
                width,
                height,
                half: self.half,
            });
        }
        if let Some(max_width) = self.max_width {
            config.max_width = max_width;
        }
        if let Some(max_height) = self.max_height {
            config.max_height = max_height;
        }
        if self.banked {
            config.prefer_linear = false;
        }
        if self.no_legacy {
            config.allow_legacy_fallback = false;
        }
        Ok(config)
    }
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    u16::from_str_radix(trim_hex(s), 16).map_err(|e| e.to_string())
}

fn parse_hex_u32(s: &str) -> Result<u32, String> {
    u32::from_str_radix(trim_hex(s), 16).map_err(|e| e.to_string())
}

fn trim_hex(s: &str) -> &str {
    s.trim_start_matches("0x").trim_end_matches(['h', 'H'])
}

fn list_modes(sim: &mut SimDpmi) -> Result<()> {
    let controller = get_controller_info(sim).context("reading controller info")?;
    println!(
        "{} (VBE {}.{}, {} KiB)",
        controller.oem_string,
        controller.version >> 8,
        controller.version & 0xFF,
        controller.total_memory_kb
    );
    for &mode in &controller.modes {
        match vbe_get_mode_info(sim, mode) {
            Ok(desc) => println!(
                "  {mode:03X}h  {}x{}x{}  pitch={}  lfb={:#010x}",
                desc.info.x_resolution,
                desc.info.y_resolution,
                desc.info.bits_per_pixel,
                desc.info.bytes_per_scan_line,
                desc.info.phys_base_ptr()
            ),
            Err(err) => println!("  {mode:03X}h  unavailable: {err}"),
        }
    }
    Ok(())
}

fn print_active(active: &ActiveMode) {
    println!(
        "active: {} {}x{}x{} ({})",
        active.mode,
        active.width,
        active.height,
        active.bits_per_pixel,
        if active.linear { "linear" } else { "banked" }
    );
    println!(
        "  screen: ({}, {})-({}, {})",
        active.screen.ulx, active.screen.uly, active.screen.lrx, active.screen.lry
    );
    if let Some(fb) = active.framebuffer {
        println!("  framebuffer: {fb}");
    }
    if let Some(window) = active.window_a {
        println!(
            "  window A: {window} size={:#x} granularity={:#x}",
            active.window_size, active.granularity
        );
    }
    if let Some(window) = active.window_b {
        println!("  window B: {window}");
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.config()?;
    tracing::debug!(?config, faults = ?args.faults(), "probe settings");
    let mut sim = SimDpmi::new()
        .with_ds_base(args.ds_base)
        .with_faults(args.faults());

    if args.list {
        list_modes(&mut sim)?;
    }

    let mut selector = StartModeSelector::new(&mut sim, config);
    selector.get_start_mode();
    let outcome = selector.status().outcome();
    drop(selector);

    match outcome {
        StartOutcome::Active(active) => {
            print_active(&active);
            if !args.keep_mode {
                reset_mode(&mut sim).context("restoring text mode")?;
            }
            Ok(())
        }
        StartOutcome::Failed(err) => bail!("no usable display mode: {err}"),
        StartOutcome::Pending => bail!("mode selection did not finish"),
    }
}
