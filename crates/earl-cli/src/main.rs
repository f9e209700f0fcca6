//! Command-line entry point: parses flags into a `RuntimeConfig`, loads
//! `~/.earl` and `~/.earl_mem`, then either runs a file to completion or
//! drives a REPL session over stdin.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use earl::{run_file, EarlResult, ModuleLoader, PersistentMem, ReplSession, RuntimeConfig, StdPrint};

/// Long-form flag names accepted bare (`--verbose`); `-c`/`-w` are the only
/// short aliases.
const BOOL_FLAGS: &[&str] = &[
    "without-stdlib",
    "repl-nocolor",
    "show-funs",
    "check",
    "to-py",
    "verbose",
    "show-bash",
    "show-lets",
    "show-muts",
    "no-sanitize-pipes",
    "error-on-bash-fail",
    "suppress-warnings",
    "disable-implicit-returns",
];

struct Invocation {
    cfg: RuntimeConfig,
    file: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> Result<Invocation, String> {
    let mut cfg = load_dotfile_config()?;
    let mut file = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-c" => cfg.set("check", true),
            "-w" => cfg.watch.push(String::new()),
            flag if flag.starts_with("--") => {
                let name = &flag[2..];
                if BOOL_FLAGS.contains(&name) {
                    cfg.set(name, true);
                } else if matches!(name, "watch" | "include" | "import") {
                    let Some(value) = iter.next() else {
                        return Err(format!("--{name} requires a value"));
                    };
                    let items: Vec<String> = value.split(',').map(str::to_owned).collect();
                    match name {
                        "watch" => cfg.watch = items,
                        "include" => cfg.include = items,
                        "import" => cfg.import = items,
                        _ => unreachable!(),
                    }
                } else {
                    return Err(format!("unknown flag `--{name}`"));
                }
            }
            path => file = Some(PathBuf::from(path)),
        }
    }
    Ok(Invocation { cfg, file })
}

fn load_dotfile_config() -> Result<RuntimeConfig, String> {
    let Some(home) = std::env::var_os("HOME") else {
        return Ok(RuntimeConfig::default());
    };
    let path = PathBuf::from(home).join(".earl");
    match std::fs::read_to_string(&path) {
        Ok(src) => RuntimeConfig::from_earl_file(&src),
        Err(_) => Ok(RuntimeConfig::default()),
    }
}

fn mem_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".earl_mem"))
}

fn run(invocation: Invocation) -> EarlResult<()> {
    let mut loader = ModuleLoader::new(invocation.cfg.include.iter().map(PathBuf::from).collect());
    let mut cfg = invocation.cfg;
    let mem = mem_path().map(PersistentMem::load).unwrap_or_default();

    if let Some(path) = invocation.file {
        let mut out = StdPrint;
        run_file(&mut out, &mut cfg, &mut loader, &path)?;
        mem.save().ok();
        return Ok(());
    }

    let mut session = ReplSession::new(cfg);
    if let Some(welcome) = session.config().repl_welcome.clone() {
        println!("{welcome}");
    }
    let stdin = std::io::stdin();
    let mut out = StdPrint;
    loop {
        if session.is_stopped() {
            break;
        }
        print!("earl> ");
        std::io::stdout().flush().ok();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        if line.trim() == "exit" {
            session.request_stop();
            continue;
        }
        if let Err(err) = session.eval_line(&mut out, &line) {
            eprintln!("{err}");
        }
    }
    mem.save().ok();
    Ok(())
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = match parse_args(&args) {
        Ok(inv) => inv,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    match run(invocation) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
