use std::path::PathBuf;
use std::process::exit;

use clap::{Arg, ArgAction, Command};

use grue::display::TerminalHost;
use grue::interpreter::Interpreter;
use grue::vm::Vm;
use grue::zrand::ZRand;

fn main() {
    env_logger::init();

    let matches = Command::new("grue")
        .about("A Z-machine version 3 interpreter")
        .arg(
            Arg::new("story")
                .value_name("STORY")
                .required(true)
                .help("path to a .z3 story file"),
        )
        .arg(
            Arg::new("no-highlight")
                .long("no-highlight")
                .action(ArgAction::SetTrue)
                .help("disable styling of object names"),
        )
        .arg(
            Arg::new("plain")
                .long("plain")
                .action(ArgAction::SetTrue)
                .help("disable all ANSI output for clean piped output"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("N")
                .value_parser(clap::value_parser!(u64))
                .help("seed the random number generator deterministically"),
        )
        .arg(
            Arg::new("save-dir")
                .long("save-dir")
                .value_name("PATH")
                .help("directory for save files (defaults to the current directory)"),
        )
        .get_matches();

    let story_path = PathBuf::from(matches.get_one::<String>("story").expect("required"));
    let story = match std::fs::read(&story_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("grue: cannot read {}: {e}", story_path.display());
            exit(1);
        }
    };

    let vm = match Vm::new(story) {
        Ok(vm) => vm,
        Err(fault) => {
            eprintln!("grue: {fault}");
            exit(1);
        }
    };

    let save_dir = matches
        .get_one::<String>("save-dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let stem = story_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "story".to_string());
    let save_path = save_dir.join(format!("{stem}.sav"));

    let plain = matches.get_flag("plain");
    let highlight = !plain && !matches.get_flag("no-highlight");
    let mut host = TerminalHost::new(plain, highlight, save_path);
    host.init();

    let rng = match matches.get_one::<u64>("seed") {
        Some(&seed) => ZRand::new_predictable(seed),
        None => ZRand::new_uniform(),
    };

    let mut interpreter = Interpreter::with_rng(vm, host, rng);
    let outcome = interpreter.run();
    interpreter.host_mut().finish();

    if let Err(fault) = outcome {
        eprintln!("grue: {fault}");
        exit(1);
    }
}
