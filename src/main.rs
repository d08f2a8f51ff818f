fn main() {
    if let Err(err) = txn_view::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
