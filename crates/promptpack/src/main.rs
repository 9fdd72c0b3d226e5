fn main() {
    if let Err(err) = promptpack::cli::run() {
        eprintln!("❌ {err:#}");
        std::process::exit(1);
    }
}
