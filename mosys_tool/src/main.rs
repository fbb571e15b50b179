use mosys_lib::commandline;

fn get_args() -> Vec<String> {
    std::env::args().collect()
}

fn main() -> Result<(), &'static str> {
    let args = commandline::parse(&get_args());
    if commandline::run_with_args(&args) != 0 {
        return Err("Fail");
    }
    Ok(())
}
