fn main() {
    if let Err(err) = tg_archive::cli::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
