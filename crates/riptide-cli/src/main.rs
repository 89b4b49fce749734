use std::{env, fs, process::ExitCode, time::Instant};

use riptide::Engine;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let Some(file_path) = args.get(1) else {
        eprintln!("usage: riptide <script.js>");
        return ExitCode::FAILURE;
    };
    let source = match fs::read_to_string(file_path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error reading {file_path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut engine = Engine::new();
    let start = Instant::now();
    match engine.eval(&source, file_path) {
        Ok(value) => {
            let elapsed = start.elapsed();
            eprintln!("completed in {elapsed:?}");
            if !value.is_undefined() {
                println!("{value}");
            }
            ExitCode::SUCCESS
        }
        Err(exception) => {
            let elapsed = start.elapsed();
            eprintln!("failed after {elapsed:?}\n{exception}");
            ExitCode::FAILURE
        }
    }
}
