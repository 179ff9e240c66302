fn main() {
    let code = logdash_client::cli::run_from_env();
    std::process::exit(code);
}
