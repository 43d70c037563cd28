fn main() {
    if let Err(err) = reward_ledger::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
