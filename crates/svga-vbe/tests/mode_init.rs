use proptest::prelude::*;
use svga_firmware::{memory::MemoryBus, vbe::VBE_LFB_BASE, FaultPlan, SimDpmi};
use svga_realmode::{AddressTranslator, DispatchError, RealPtr};
use svga_vbe::{
    reset_mode, vbe_get_mode_info, Candidate, InitState, ModeInitializer, ModeNumber, VideoError,
};

fn sim_with(faults: FaultPlan) -> SimDpmi {
    SimDpmi::new().with_faults(faults)
}

#[test]
fn rejecting_firmware_exhausts_640x480_list_without_translation() {
    let mut sim = sim_with(FaultPlan {
        reject_all: true,
        ..FaultPlan::default()
    });
    let mut init = ModeInitializer::new(&mut sim);
    assert_eq!(
        init.init_mode_640_480(),
        Err(VideoError::Exhausted { attempts: 2 })
    );
    assert_eq!(init.state(), InitState::Failed);
    drop(init);

    assert_eq!(sim.translate_calls(), 0);
    assert_eq!(sim.call_log(), &[(0x10, 0x4F01), (0x10, 0x4F01)]);
}

#[test]
fn adapter_without_lfb_falls_back_to_banked_window() {
    let mut sim = sim_with(FaultPlan {
        no_linear_framebuffer: true,
        ..FaultPlan::default()
    });
    let mut init = ModeInitializer::new(&mut sim);
    let active = init.init_mode_640_480().unwrap();

    assert!(!active.linear);
    assert_eq!(active.framebuffer, None);
    assert_eq!(active.window_a, Some(svga_realmode::LinearAddr(0xA0000)));
    assert_eq!(active.granularity, 0x10000);
    assert!(matches!(
        init.rejections(),
        [(_, VideoError::Mismatch {
            reason: "no linear framebuffer",
            ..
        })]
    ));
    drop(init);

    // Pixel (0, 200) of 640x480 lives in bank 1.
    let offset = 200 * u32::from(active.pitch);
    let (bank, within) = active.bank_for(offset).unwrap();
    assert_eq!(bank, 1);
    active.set_bank(&mut sim, 0, bank).unwrap();
    let window = active.window_a.unwrap();
    assert!(sim.write_linear(window.offset(within as usize), 0x5A));
    assert_eq!(sim.firmware().vbe.vram()[offset as usize], 0x5A);
}

#[test]
fn bank_past_framebuffer_is_firmware_rejected() {
    let mut sim = sim_with(FaultPlan {
        no_linear_framebuffer: true,
        ..FaultPlan::default()
    });
    let active = ModeInitializer::new(&mut sim).init_mode_640_480().unwrap();
    assert_eq!(
        active.set_bank(&mut sim, 0, 5),
        Err(VideoError::FirmwareRejected {
            function: 0x4F05,
            ax: 0x014F
        })
    );
}

#[test]
fn rejected_mode_set_is_an_activation_failure() {
    let mut sim = sim_with(FaultPlan {
        reject_set_mode: true,
        ..FaultPlan::default()
    });
    let mut init = ModeInitializer::new(&mut sim);
    assert!(init.init_vesa_mode(0x103, 800, 600, false).is_err());
    let errors: Vec<_> = init.rejections().iter().map(|(_, e)| e.clone()).collect();
    assert_eq!(
        errors,
        vec![
            VideoError::Activation {
                mode: 0x103,
                ax: 0x014F
            },
            VideoError::Activation {
                mode: 0x103,
                ax: 0x014F
            },
        ]
    );
    assert_eq!(sim.firmware().vbe.current_mode, None);
}

#[test]
fn legacy_mode_is_confirmed_and_reset_restores_text() {
    let mut sim = SimDpmi::new();
    let active = ModeInitializer::new(&mut sim)
        .run(&[Candidate::legacy_13h()])
        .unwrap();
    assert_eq!(active.mode, ModeNumber::Legacy(0x13));
    assert_eq!(active.pitch, 320);
    assert_eq!(active.window_a, Some(svga_realmode::LinearAddr(0xA0000)));
    assert_eq!(sim.firmware().video_mode(), 0x13);

    reset_mode(&mut sim).unwrap();
    assert_eq!(sim.firmware().video_mode(), 0x03);
}

#[test]
fn reset_after_vbe_mode_clears_it() {
    let mut sim = SimDpmi::new();
    ModeInitializer::new(&mut sim)
        .init_vesa_mode(0x105, 1024, 768, false)
        .unwrap();
    assert_eq!(sim.firmware().vbe.current_mode, Some(0x105));
    reset_mode(&mut sim).unwrap();
    assert_eq!(sim.firmware().vbe.current_mode, None);
}

#[test]
fn unmappable_framebuffer_never_sets_the_mode() {
    let mut sim = sim_with(FaultPlan {
        no_physical_mapping: true,
        ..FaultPlan::default()
    });
    let mut init = ModeInitializer::new(&mut sim);
    assert_eq!(
        init.run(&[Candidate::vesa(0x101, 640, 480, false, true)]),
        Err(VideoError::Exhausted { attempts: 1 })
    );
    assert!(matches!(
        init.rejections(),
        [(_, VideoError::FramebufferMapping { phys: VBE_LFB_BASE })]
    ));
    drop(init);

    assert_eq!(sim.firmware().vbe.current_mode, None);
    assert!(!sim.call_log().contains(&(0x10, 0x4F02)));
}

#[test]
fn unmappable_framebuffer_falls_back_to_banked_window() {
    let mut sim = sim_with(FaultPlan {
        no_physical_mapping: true,
        ..FaultPlan::default()
    });
    let mut init = ModeInitializer::new(&mut sim);
    let active = init.init_mode_640_480().unwrap();

    assert!(!active.linear);
    assert_eq!(active.framebuffer, None);
    assert!(active.window_a.is_some());
    assert!(matches!(
        init.rejections(),
        [(_, VideoError::FramebufferMapping { .. })]
    ));
    drop(init);

    assert_eq!(sim.firmware().vbe.current_mode, Some(0x101));
    assert!(!sim.firmware().vbe.lfb_enabled);
}

#[test]
fn untranslatable_legacy_window_restores_text_mode() {
    let mut sim = sim_with(FaultPlan {
        no_translation: true,
        ..FaultPlan::default()
    });
    let mut init = ModeInitializer::new(&mut sim);
    assert_eq!(
        init.run(&[Candidate::legacy_13h()]),
        Err(VideoError::Exhausted { attempts: 1 })
    );
    assert!(matches!(
        init.rejections(),
        [(_, VideoError::Translation { segment: 0xA000 })]
    ));
    drop(init);

    assert_eq!(sim.firmware().video_mode(), 0x03);
}

#[test]
fn unsupported_mode_is_rejected_before_translation() {
    let mut sim = sim_with(FaultPlan {
        unsupported_modes: true,
        ..FaultPlan::default()
    });
    assert_eq!(
        vbe_get_mode_info(&mut sim, 0x101),
        Err(VideoError::ModeNotSupported { mode: 0x101 })
    );
    assert_eq!(sim.translate_calls(), 0);

    let mut init = ModeInitializer::new(&mut sim);
    assert_eq!(
        init.init_mode_640_480(),
        Err(VideoError::Exhausted { attempts: 2 })
    );
    assert!(init
        .rejections()
        .iter()
        .all(|(_, err)| *err == VideoError::ModeNotSupported { mode: 0x101 }));
    drop(init);

    assert_eq!(sim.translate_calls(), 0);
    assert!(!sim.call_log().contains(&(0x10, 0x4F02)));
}

#[test]
fn refusing_host_fails_every_candidate_without_running_firmware() {
    let mut sim = sim_with(FaultPlan {
        host_rejects: true,
        ..FaultPlan::default()
    });
    let mut init = ModeInitializer::new(&mut sim);
    assert_eq!(
        init.init_mode_640_480(),
        Err(VideoError::Exhausted { attempts: 2 })
    );
    let errors: Vec<_> = init.rejections().iter().map(|(_, e)| e.clone()).collect();
    let refused = VideoError::Dispatch(DispatchError::Rejected { code: 0x8001 });
    assert_eq!(errors, vec![refused.clone(), refused]);
    drop(init);

    assert_eq!(sim.int_calls(), 0);
    assert!(sim.call_log().is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn described_window_maps_every_offset(ds_base in 0u32..0x9_0000, offset in 0usize..0x1_0000) {
        let mut sim = SimDpmi::new().with_ds_base(ds_base);
        let desc = vbe_get_mode_info(&mut sim, 0x101).unwrap();
        prop_assert!(desc.info.is_supported());

        let window = desc.window_a.unwrap();
        let via_translator = sim
            .real_to_linear(RealPtr::new(desc.info.win_a_segment, offset as u16))
            .unwrap();
        prop_assert_eq!(window.offset(offset), via_translator);
        prop_assert_eq!(
            sim.linear_to_phys(window.offset(offset)),
            Some(0xA_0000 + offset as u32)
        );
    }

    #[test]
    fn describe_success_implies_supported(mode in 0u16..0x200) {
        let mut sim = SimDpmi::new();
        match vbe_get_mode_info(&mut sim, mode) {
            Ok(desc) => prop_assert!(desc.info.is_supported()),
            Err(err) => prop_assert!(err.is_retryable_with_next_candidate()),
        }
    }

    #[test]
    fn linear_framebuffer_writes_reach_vram(x in 0u32..1024, y in 0u32..768, value in any::<u8>()) {
        let mut sim = SimDpmi::new().with_ds_base(0x1000);
        let active = ModeInitializer::new(&mut sim)
            .init_vesa_mode(0x105, 1024, 768, false)
            .unwrap();
        let fb = active.framebuffer.unwrap();
        let offset = y * u32::from(active.pitch) + x;
        prop_assert!(sim.write_linear(fb.offset(offset as usize), value));
        prop_assert_eq!(sim.firmware().read_u8(VBE_LFB_BASE + offset), value);
    }
}
