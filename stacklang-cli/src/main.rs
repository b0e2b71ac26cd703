use clap::Parser;
use stacklang::config::get_config;
use stacklang::value::Snapshot;
use stacklang::vm::{Event, VMOptions};
use stacklang::StackLang;
use std::io::Read;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Run a stacklang program.
#[derive(Parser, Debug)]
#[command()]
struct Args {
    /// File containing a stacklang program, `-` or nothing for stdin.
    #[arg()]
    file: Option<String>,
    /// Maximum stack size.
    #[arg(long, short = 'm')]
    max_stack_size: Option<usize>,
    /// Maximum depth of nested block invocations.
    #[arg(long, short = 'd')]
    max_call_depth: Option<usize>,
    /// A limit for the number of evaluations.
    /// If the limit is reached, the program will be stopped with an error.
    #[arg(long, short = 'l')]
    op_limit: Option<u64>,
    /// Print every event (state changes, pops and output).
    #[arg(long, short = 'e')]
    events: bool,
    /// Pause between printed events, in milliseconds.
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,
    /// Print statistics after running the program.
    #[arg(long, short = 's')]
    stats: bool,
}

fn read_program(file: Option<&str>) -> Result<String, anyhow::Error> {
    Ok(match file {
        None | Some("-") => {
            let mut source = String::new();
            std::io::stdin().read_to_string(&mut source)?;
            source
        }
        Some(file) => std::fs::read_to_string(file)?,
    })
}

fn print_event(event: &Event) {
    match event {
        Event::State(state) => println!("state   {state}"),
        Event::StackPop { state, value } => println!("pop {value}  {state}"),
        Event::Output(value) => println!("output  {value}"),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let source = read_program(args.file.as_deref())?;

    let config = get_config();
    let options = VMOptions::new(
        args.max_stack_size.unwrap_or(config.max_stack_size),
        args.max_call_depth.unwrap_or(config.max_call_depth),
        args.op_limit.unwrap_or(config.max_op_count),
    );
    let delay = Duration::from_millis(args.delay_ms);

    let start_time = std::time::Instant::now();
    let mut run = StackLang::with_options(&source, options);
    let mut last_state: Option<Snapshot> = None;
    for event in run.by_ref() {
        let event = match event {
            Ok(event) => event,
            Err(error) => {
                if let Some(state) = &last_state {
                    eprintln!("Last state: {state}");
                }
                return Err(error.into());
            }
        };

        if args.events {
            print_event(&event);
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        } else if let Event::Output(value) = &event {
            println!("{value}");
        }
        if let Some(state) = event.snapshot() {
            last_state = Some(state.clone());
        }
    }
    let elapsed = start_time.elapsed();

    let machine = run.machine();
    if !machine.blocks().is_empty() {
        tracing::warn!(open = machine.blocks().len(), "program ended inside an unclosed block");
    }

    if args.stats {
        print_stats(machine.instructions_run(), elapsed);
    }

    for value in machine.stack() {
        println!("{}", value);
    }

    Ok(())
}

fn print_stats(instruction_counter: u64, elapsed: Duration) {
    let evaluations_per_second = instruction_counter as f64 / elapsed.as_secs_f64();
    eprintln!("Execution time: {:?}", elapsed);
    eprintln!(
        "Evaluations: {} ({}/s)",
        instruction_counter,
        match evaluations_per_second {
            n if n >= 1_000_000.0 => format!("{:.1}M", n / 1_000_000.0),
            n if n >= 1_000.0 => format!("{:.1}k", n / 1_000.0),
            n => format!("{:.1}", n),
        }
    );
}
