use batch_pipeline::logging;
use batch_pipeline::pipeline::{self, BenchOptions};

fn parse_usize_list(arg: &str) -> Option<Vec<usize>> {
    if arg == "-" {
        return None;
    }
    let mut values = Vec::new();
    for part in arg.split(',') {
        if part.trim().is_empty() {
            return None;
        }
        let value = part.trim().parse::<usize>().ok()?;
        values.push(value);
    }
    Some(values)
}

fn print_usage(program: &str) {
    println!("Batch Pipeline CLI");
    println!("Usage:");
    println!("  {program} (run demo)");
    println!("  {program} bench [tasks] [workers] [batch] [work_ms] [lossy] [grace]");
    println!("  {program} stress [task_sets] [worker_sets] [batch_sets] [work_ms] [lossy] [grace]");
    println!("  {program} --help");
    println!();
    println!("Sets are comma-separated lists (e.g., 1,2,4). Use \"-\" to keep a default set.");
    println!("Defaults:");
    println!("  demo   tasks=20 workers=4 batch=5 work=50-150ms");
    println!("  bench  tasks=100 workers=4 batch=5 work_ms=5");
    println!("  stress tasks=0,1,20,100 workers=1,2,4,8 batch=1,5,16 work_ms=5");
    println!("Flags:");
    println!("  lossy  drop batch signals raised while the reporter is busy");
    println!("  grace  abandon the reporter after a grace period instead of joining it");
    println!("Logging: set PIPELINE_LOG (e.g. debug) to adjust stderr narration.");
}

fn exit_with_usage(program: &str, message: &str) -> ! {
    eprintln!("{message}");
    print_usage(program);
    std::process::exit(2);
}

/// Pull `lossy` / `grace` flags out; returns the remaining positional args.
fn split_flags(args: impl Iterator<Item = String>, options: &mut BenchOptions) -> Vec<String> {
    let mut positional = Vec::new();
    for arg in args {
        match arg.as_str() {
            "lossy" => options.lossy = true,
            "grace" => options.grace = true,
            _ => positional.push(arg),
        }
    }
    positional
}

fn parse_count(program: &str, command: &str, name: &str, arg: Option<&String>) -> Option<usize> {
    let arg = arg?;
    if arg == "-" {
        return None;
    }
    match arg.parse::<usize>() {
        Ok(value) => Some(value),
        Err(_) => exit_with_usage(program, &format!("{command}: invalid {name} value: {arg}")),
    }
}

fn parse_set(program: &str, name: &str, arg: Option<&String>) -> Option<Vec<usize>> {
    let arg = arg?;
    if arg == "-" {
        return None;
    }
    match parse_usize_list(arg) {
        Some(values) => Some(values),
        None => exit_with_usage(program, &format!("stress: invalid {name} value: {arg}")),
    }
}

fn main() {
    logging::init_logging();

    let program = std::env::args()
        .next()
        .unwrap_or_else(|| "batch_pipeline".to_string());
    let mut args = std::env::args().skip(1);
    let outcome = match args.next().as_deref() {
        Some("bench") => {
            let mut options = BenchOptions::default();
            let positional = split_flags(args, &mut options);
            if positional.len() > 4 {
                exit_with_usage(&program, &format!("bench: unexpected argument: {}", positional[4]));
            }
            let tasks = parse_count(&program, "bench", "tasks", positional.first());
            let workers = parse_count(&program, "bench", "workers", positional.get(1));
            let batch = parse_count(&program, "bench", "batch", positional.get(2));
            options.work_ms = parse_count(&program, "bench", "work_ms", positional.get(3))
                .map(|ms| ms as u64);
            pipeline::run_benchmark(tasks, workers, batch, options)
        }
        Some("stress") => {
            let mut options = BenchOptions::default();
            let positional = split_flags(args, &mut options);
            if positional.len() > 4 {
                exit_with_usage(&program, &format!("stress: unexpected argument: {}", positional[4]));
            }
            let task_sets = parse_set(&program, "task_sets", positional.first());
            let worker_sets = parse_set(&program, "worker_sets", positional.get(1));
            let batch_sets = parse_set(&program, "batch_sets", positional.get(2));
            options.work_ms = parse_count(&program, "stress", "work_ms", positional.get(3))
                .map(|ms| ms as u64);
            pipeline::run_stress(task_sets, worker_sets, batch_sets, options)
        }
        Some("--help") | Some("-h") | Some("help") => {
            print_usage(&program);
            Ok(())
        }
        Some(other) => exit_with_usage(&program, &format!("unknown command: {other}")),
        None => pipeline::run_demo(),
    };

    if let Err(err) = outcome {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
