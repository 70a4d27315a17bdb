fn main() {
    #[cfg(feature = "cli")]
    oxisync::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("oxisync: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
