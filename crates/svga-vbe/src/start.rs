//! Startup mode selection.

use std::sync::{Arc, Mutex, PoisonError};

use svga_realmode::RealModeServices;
use tracing::{debug, error, info, warn};

use crate::{
    config::{StartMode, SvgaConfig},
    controller::get_controller_info,
    error::VideoError,
    init::{ActiveMode, Candidate, InitState, ModeInitializer, VBE_MODE_640X480X8},
    mode_info::MemoryModel,
    query::ModeQuery,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// `get_start_mode` has not finished.
    Pending,
    Active(ActiveMode),
    /// No mode could be activated. The application cannot continue.
    Failed(VideoError),
}

/// Shared result of startup mode selection.
#[derive(Debug)]
pub struct VideoStatus {
    outcome: Mutex<StartOutcome>,
}

impl Default for VideoStatus {
    fn default() -> Self {
        Self {
            outcome: Mutex::new(StartOutcome::Pending),
        }
    }
}

impl VideoStatus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn outcome(&self) -> StartOutcome {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.outcome(), StartOutcome::Active(_))
    }

    pub fn active_mode(&self) -> Option<ActiveMode> {
        match self.outcome() {
            StartOutcome::Active(mode) => Some(mode),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<VideoError> {
        match self.outcome() {
            StartOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    fn set(&self, outcome: StartOutcome) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = outcome;
    }
}

/// Chooses and activates the display mode at process start.
pub struct StartModeSelector<S> {
    svc: S,
    config: SvgaConfig,
    status: Arc<VideoStatus>,
    history: Vec<InitState>,
}

impl<S: RealModeServices> StartModeSelector<S> {
    pub fn new(svc: S, config: SvgaConfig) -> Self {
        Self::with_status(svc, config, VideoStatus::new())
    }

    pub fn with_status(svc: S, config: SvgaConfig, status: Arc<VideoStatus>) -> Self {
        Self {
            svc,
            config,
            status,
            history: Vec::new(),
        }
    }

    pub fn status(&self) -> Arc<VideoStatus> {
        Arc::clone(&self.status)
    }

    pub fn config(&self) -> &SvgaConfig {
        &self.config
    }

    /// Initializer states entered by the last `get_start_mode` call.
    pub fn history(&self) -> &[InitState] {
        &self.history
    }

    pub fn services(&mut self) -> &mut S {
        &mut self.svc
    }

    pub fn into_inner(self) -> S {
        self.svc
    }

    /// Selects and activates a mode, recording the outcome in [`VideoStatus`].
    ///
    /// Ends with the status either `Active` or `Failed`.
    pub fn get_start_mode(&mut self) {
        self.status.set(StartOutcome::Pending);
        self.history.clear();

        if let Err(err) = self.config.validate() {
            error!(error = %err, "video configuration rejected");
            self.status.set(StartOutcome::Failed(err));
            return;
        }

        let candidates = self.candidates();
        debug!(count = candidates.len(), "start mode candidates");

        let mut init =
            ModeInitializer::new(&mut self.svc).with_prefer_linear(self.config.prefer_linear);
        let result = init.run(&candidates);
        self.history = init.history().to_vec();

        match result {
            Ok(active) => {
                info!(
                    mode = %active.mode,
                    width = active.width,
                    height = active.height,
                    "start mode selected"
                );
                self.status.set(StartOutcome::Active(active));
            }
            Err(err) => {
                error!(error = %err, "no usable display mode");
                self.status.set(StartOutcome::Failed(err));
            }
        }
    }

    fn candidates(&mut self) -> Vec<Candidate> {
        let prefer_linear = self.config.prefer_linear;
        let mut candidates = match self.config.start_mode {
            StartMode::Fixed(fixed) => {
                info!(
                    mode = fixed.mode,
                    width = fixed.width,
                    height = fixed.height,
                    "using saved mode"
                );
                let mut list = Candidate::vesa_pair(
                    fixed.mode,
                    fixed.width,
                    fixed.height,
                    fixed.half,
                    prefer_linear,
                )
                .to_vec();
                for candidate in default_candidates(prefer_linear) {
                    if !list.contains(&candidate) {
                        list.push(candidate);
                    }
                }
                list
            }
            StartMode::Auto => self.detect_candidates(),
        };
        if self.config.allow_legacy_fallback {
            candidates.push(Candidate::legacy_13h());
        }
        candidates
    }

    /// Usable 8bpp modes reported by the adapter, largest first.
    fn detect_candidates(&mut self) -> Vec<Candidate> {
        let prefer_linear = self.config.prefer_linear;
        let controller = match get_controller_info(&mut self.svc) {
            Ok(controller) => controller,
            Err(err) => {
                warn!(error = %err, "controller info unavailable; using 640x480");
                return default_candidates(prefer_linear).to_vec();
            }
        };

        let mut usable = Vec::new();
        let mut query = ModeQuery::new(&mut self.svc);
        for &mode in &controller.modes {
            let desc = match query.describe(mode) {
                Ok(desc) => desc,
                Err(err) => {
                    debug!(mode, error = %err, "skipping listed mode");
                    continue;
                }
            };
            let info = &desc.info;
            let fits = info.is_graphics()
                && info.bits_per_pixel == 8
                && info.memory_model == MemoryModel::PackedPixel
                && (SvgaConfig::MIN_WIDTH..=self.config.max_width).contains(&info.x_resolution)
                && (SvgaConfig::MIN_HEIGHT..=self.config.max_height).contains(&info.y_resolution);
            if fits {
                usable.push((mode, info.x_resolution, info.y_resolution));
            }
        }

        if usable.is_empty() {
            warn!("adapter lists no usable 8bpp mode; using 640x480");
            return default_candidates(prefer_linear).to_vec();
        }

        usable.sort_by_key(|&(_, w, h)| std::cmp::Reverse(u32::from(w) * u32::from(h)));
        usable
            .into_iter()
            .flat_map(|(mode, w, h)| Candidate::vesa_pair(mode, w, h, false, prefer_linear))
            .collect()
    }
}

fn default_candidates(prefer_linear: bool) -> [Candidate; 2] {
    Candidate::vesa_pair(VBE_MODE_640X480X8, 640, 480, false, prefer_linear)
}

#[cfg(test)]
mod tests {
    use svga_firmware::{FaultPlan, SimDpmi};

    use super::*;
    use crate::{config::FixedMode, init::ModeNumber};

    #[test]
    fn auto_picks_largest_mode_within_limits() {
        let mut selector = StartModeSelector::new(SimDpmi::new(), SvgaConfig::default());
        selector.get_start_mode();

        let active = selector.status().active_mode().unwrap();
        assert_eq!(active.mode, ModeNumber::Vbe(0x105));
        assert_eq!((active.width, active.height), (1024, 768));
        assert!(active.linear);
        assert_eq!(selector.history().last(), Some(&InitState::Active));
    }

    #[test]
    fn auto_candidate_order() {
        let mut selector = StartModeSelector::new(
            SimDpmi::new(),
            SvgaConfig {
                max_width: 800,
                max_height: 600,
                ..SvgaConfig::default()
            },
        );
        let modes: Vec<_> = selector
            .candidates()
            .iter()
            .map(|c| (c.mode, c.linear))
            .collect();
        assert_eq!(
            modes,
            vec![
                (ModeNumber::Vbe(0x103), true),
                (ModeNumber::Vbe(0x103), false),
                (ModeNumber::Vbe(0x101), true),
                (ModeNumber::Vbe(0x101), false),
                (ModeNumber::Legacy(0x13), false),
            ]
        );
    }

    #[test]
    fn invalid_controller_info_falls_back_to_640x480() {
        for faults in [
            FaultPlan {
                bad_controller_signature: true,
                ..FaultPlan::default()
            },
            FaultPlan {
                null_mode_list: true,
                ..FaultPlan::default()
            },
        ] {
            let sim = SimDpmi::new().with_faults(faults);
            let mut selector = StartModeSelector::new(sim, SvgaConfig::default());
            let modes: Vec<_> = selector
                .candidates()
                .iter()
                .map(|c| (c.mode, c.linear))
                .collect();
            assert_eq!(
                modes,
                vec![
                    (ModeNumber::Vbe(0x101), true),
                    (ModeNumber::Vbe(0x101), false),
                    (ModeNumber::Legacy(0x13), false),
                ]
            );

            selector.get_start_mode();
            let active = selector.status().active_mode().unwrap();
            assert_eq!(active.mode, ModeNumber::Vbe(0x101));
            assert!(active.linear);
        }
    }

    #[test]
    fn fixed_mode_list_is_deduplicated() {
        let config = SvgaConfig {
            start_mode: StartMode::Fixed(FixedMode {
                mode: 0x101,
                width: 640,
                height: 480,
                half: false,
            }),
            allow_legacy_fallback: false,
            ..SvgaConfig::default()
        };
        let mut selector = StartModeSelector::new(SimDpmi::new(), config);
        assert_eq!(selector.candidates().len(), 2);
    }

    #[test]
    fn invalid_config_fails_without_firmware_calls() {
        let config = SvgaConfig {
            max_width: 100,
            ..SvgaConfig::default()
        };
        let mut selector = StartModeSelector::new(SimDpmi::new(), config);
        selector.get_start_mode();
        assert!(matches!(
            selector.status().failure(),
            Some(VideoError::Config(_))
        ));
        assert_eq!(selector.into_inner().int_calls(), 0);
    }

    #[test]
    fn unavailable_host_fails_startup() {
        let sim = SimDpmi::new().with_faults(FaultPlan {
            unavailable: true,
            ..FaultPlan::default()
        });
        let mut selector = StartModeSelector::new(sim, SvgaConfig::default());
        selector.get_start_mode();
        assert_eq!(
            selector.status().failure(),
            Some(VideoError::Exhausted { attempts: 3 })
        );
        assert!(!selector.status().is_active());
    }
}
