use svga_vbe::{FixedMode, StartMode, SvgaConfig, VideoError};

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = SvgaConfig::load(dir.path().join("svga.json")).unwrap();
    assert_eq!(config, SvgaConfig::default());
}

#[test]
fn saved_config_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("svga.json");
    let config = SvgaConfig {
        start_mode: StartMode::Fixed(FixedMode {
            mode: 0x103,
            width: 800,
            height: 600,
            half: true,
        }),
        prefer_linear: false,
        ..SvgaConfig::default()
    };
    config.save(&path).unwrap();
    assert_eq!(SvgaConfig::load(&path).unwrap(), config);
}

#[test]
fn malformed_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("svga.json");
    std::fs::write(&path, "{ start_mode: ").unwrap();
    assert!(matches!(SvgaConfig::load(&path), Err(VideoError::Config(_))));
}
