#[ctor::ctor(anonymous)]
fn test_init() {
    let _ = env_logger::builder()
        .parse_env(env_logger::Env::default().default_filter_or("debug"))
        .format_level(true)
        .format_timestamp_micros()
        // Panic info and stacktrace will be written to stderr
        // Log to stdout to avoid mixing with panic info
        .target(env_logger::Target::Stdout)
        .is_test(true)
        .try_init();
}
