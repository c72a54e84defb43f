/// Initialize the logger with the specified verbosity level
///
/// # Arguments
/// * `verbose` - Verbosity level (0=warn, 1=info, 2=debug, 3+=trace)
///
/// `RUST_LOG` takes precedence over the verbosity-derived filter. Calling this
/// more than once is harmless; later calls leave the first logger in place.
pub fn setup_logger(verbose: u8) {
    let env = env_logger::Env::default().default_filter_or(filter_for(verbose));
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .try_init();
}

fn filter_for(verbose: u8) -> &'static str {
    match verbose {
        0 => "pathlock=warn",
        1 => "pathlock=info",
        2 => "pathlock=debug",
        _ => "pathlock=trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_filter() {
        assert_eq!(filter_for(0), "pathlock=warn");
        assert_eq!(filter_for(2), "pathlock=debug");
        assert_eq!(filter_for(9), "pathlock=trace");
    }

    #[test]
    fn repeated_setup_does_not_panic() {
        setup_logger(2);
        setup_logger(0);
        log::debug!("logger initialised");
    }
}
