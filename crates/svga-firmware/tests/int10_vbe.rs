use proptest::prelude::*;
use svga_firmware::{
    memory::MemoryBus,
    vbe::{VBE_BANK_WINDOW_SIZE, VBE_LFB_BASE},
    FaultPlan, SimDpmi,
};
use svga_realmode::{AddressTranslator, ConventionalMemory, InterruptInvoker, RealPtr, RmRegs};

fn read_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn int10(sim: &mut SimDpmi, regs: &mut RmRegs) {
    sim.rmint(0x10, regs).expect("dispatch");
}

#[test]
fn controller_and_mode_info_through_transfer_buffer() {
    let mut sim = SimDpmi::new();
    let buffer = sim.transfer_buffer();

    let mut regs = RmRegs::new();
    regs.set_ax(0x4F00);
    regs.set_es(buffer.segment);
    regs.set_di(buffer.offset);
    int10(&mut sim, &mut regs);
    assert_eq!(regs.ax(), 0x004F);
    assert!(!regs.carry());

    let mut info = vec![0u8; 512];
    sim.read_real(buffer, &mut info).unwrap();
    assert_eq!(&info[0..4], b"VESA");
    assert_eq!(read_u16(&info, 4), 0x0200);

    let list = RealPtr::from_far(read_u32(&info, 14));
    let mut modes = Vec::new();
    for i in 0..64u16 {
        let mut raw = [0u8; 2];
        sim.read_real(list.wrapping_add(i * 2), &mut raw).unwrap();
        let mode = u16::from_le_bytes(raw);
        if mode == 0xFFFF {
            break;
        }
        modes.push(mode);
    }
    assert_eq!(modes, vec![0x100, 0x101, 0x103, 0x105, 0x107, 0x112]);

    let mut assert_mode_info = |mode: u16, width: u16, height: u16, bpp: u8| {
        regs.clear();
        regs.set_ax(0x4F01);
        regs.set_cx(mode);
        regs.set_es(buffer.segment);
        regs.set_di(buffer.offset);
        int10(&mut sim, &mut regs);
        assert_eq!(regs.ax(), 0x004F);

        let mut info = [0u8; 256];
        sim.read_real(buffer, &mut info).unwrap();
        assert_eq!(read_u16(&info, 0) & 0x0001, 0x0001); // ModeAttributes: supported
        assert_eq!(read_u16(&info, 8), 0xA000); // WinASegment
        assert_eq!(read_u16(&info, 18), width); // XResolution
        assert_eq!(read_u16(&info, 20), height); // YResolution
        assert_eq!(info[25], bpp); // BitsPerPixel
        assert_eq!(read_u32(&info, 40), VBE_LFB_BASE); // PhysBasePtr
    };

    assert_mode_info(0x101, 640, 480, 8);
    assert_mode_info(0x105, 1024, 768, 8);
    assert_mode_info(0x4103, 800, 600, 8);
    assert_mode_info(0x112, 640, 480, 32);
}

#[test]
fn no_lfb_adapter_clears_attribute_and_rejects_lfb_set() {
    let mut sim = SimDpmi::new().with_faults(FaultPlan {
        no_linear_framebuffer: true,
        ..FaultPlan::default()
    });
    let buffer = sim.transfer_buffer();
    let mut regs = RmRegs::new();
    regs.set_ax(0x4F01);
    regs.set_cx(0x101);
    regs.set_es(buffer.segment);
    int10(&mut sim, &mut regs);
    let mut info = [0u8; 256];
    sim.read_real(buffer, &mut info).unwrap();
    assert_eq!(read_u16(&info, 0) & 0x0080, 0);

    regs.clear();
    regs.set_ax(0x4F02);
    regs.set_bx(0x4101);
    int10(&mut sim, &mut regs);
    assert_eq!(regs.ax(), 0x014F);

    regs.set_ax(0x4F02);
    regs.set_bx(0x0101);
    int10(&mut sim, &mut regs);
    assert_eq!(regs.ax(), 0x004F);

    regs.set_ax(0x4F03);
    int10(&mut sim, &mut regs);
    assert_eq!(regs.bx(), 0x0101);
}

#[test]
fn non_video_vectors_return_registers_unchanged() {
    let mut sim = SimDpmi::new();
    let mut regs = RmRegs::new();
    regs.set_eax(0x1234_4F01);
    sim.rmint(0x16, &mut regs).unwrap();
    assert_eq!(regs.eax(), 0x1234_4F01);
    assert_eq!(sim.call_log(), &[(0x16, 0x4F01)]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn bank_window_translation_round_trips(
        ds_base in 0u32..0x8000,
        bank in 0u16..5,
        offset in 0u32..VBE_BANK_WINDOW_SIZE,
        value in any::<u8>(),
    ) {
        let mut sim = SimDpmi::new().with_ds_base(ds_base);
        let mut regs = RmRegs::new();
        regs.set_ax(0x4F02);
        regs.set_bx(0x0101);
        int10(&mut sim, &mut regs);
        regs.set_ax(0x4F05);
        regs.set_bx(0);
        regs.set_dx(bank);
        int10(&mut sim, &mut regs);
        prop_assert_eq!(regs.ax(), 0x004F);

        let window = sim.real_to_linear(RealPtr::new(0xA000, 0)).unwrap();
        prop_assert!(sim.write_linear(window.offset(offset as usize), value));

        let phys = 0xA0000 + offset;
        prop_assert_eq!(sim.linear_to_phys(window.offset(offset as usize)), Some(phys));
        prop_assert_eq!(sim.firmware().read_u8(phys), value);
        let vram = u32::from(bank) * 0x10000 + offset;
        prop_assert_eq!(sim.firmware().read_u8(VBE_LFB_BASE + vram), value);
    }
}
