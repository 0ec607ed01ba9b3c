fn main() {
    if let Err(err) = stockroom::cli::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
