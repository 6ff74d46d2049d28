// Dicebars console front end
// Rolls dice (or draws a chaos medley) over a MIDI folder and writes the spliced result

use clap::{Parser, ValueEnum};
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use dicebars_lib::selection::{describe_roll, DiceRoll};
use dicebars_lib::{
    compose_to_file, load_corpus, new_session_from_config, spin, undo, CommandError, CommandResult, EngineConfig,
    GameSession, Pick, SelectionMode, SessionState,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Dice totals choose the file and favour clean bars
    Dice,

    /// Uniform draw over every eligible bar
    #[value(alias = "chaos")]
    Medley,
}

impl From<ModeArg> for SelectionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Dice => SelectionMode::Dice,
            ModeArg::Medley => SelectionMode::Chaos,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "dicebars", version, about = "Musical dice game over a folder of MIDI files")]
struct Cli {
    /// Selection mode
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Number of dice / bars (3 or 4)
    #[arg(long, value_parser = clap::value_parser!(u8).range(3..=4))]
    spins: Option<u8>,

    /// RNG seed (same seed => same picks)
    #[arg(long)]
    seed: Option<u64>,

    /// Forced dice total for the next spin; repeat to force several in order
    #[arg(long = "force")]
    force: Vec<u32>,

    /// Roll every spin without prompting
    #[arg(long)]
    auto: bool,

    /// Output .mid path (defaults to a fixed name per mode)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Folder of source MIDI files
    #[arg(long)]
    corpus: Option<PathBuf>,

    /// Config file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e.message());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CommandResult<()> {
    let mut config = EngineConfig::load(cli.config.as_deref())?;
    if let Some(spins) = cli.spins {
        config.spins = spins;
    }
    let mode = cli.mode.map(SelectionMode::from).unwrap_or(config.mode);
    let corpus_dir = cli.corpus.clone().unwrap_or_else(|| config.corpus_dir.clone());
    let output = cli.output.clone().unwrap_or_else(|| config.output_for(mode).to_path_buf());

    let corpus = load_corpus(&corpus_dir)?;
    if corpus.total_eligible_bars() == 0 {
        return Err(CommandError::from("No eligible bars in the corpus; every file is shorter than one bar"));
    }

    let mut session = new_session_from_config(&corpus, &config, mode, cli.seed)?;
    println!(
        "{} game: {} spins over {} files (seed {})",
        mode.as_str(),
        session.spins_total().get(),
        corpus.eligible_files().count(),
        session.seed()
    );

    let mut forced: VecDeque<u32> = cli.force.into();
    let finished = if cli.auto {
        while !session.is_complete() {
            take_spin(&mut session, forced.pop_front())?;
        }
        true
    } else {
        play_interactive(&mut session, &mut forced)?
    };

    if !finished {
        println!("Quit without composing");
        return Ok(());
    }

    let (composition, path) = compose_to_file(&session, &corpus, &config.export, &output)?;
    println!();
    println!("Melody details:");
    for line in &composition.log_lines {
        println!("  {}", line);
    }
    println!("Saved {}", path.display());

    Ok(())
}

/// Prompt loop: enter rolls, a number forces the total, u undoes, r resets, q quits
///
/// Returns false when the player quit before the last spin.
fn play_interactive(session: &mut GameSession, forced: &mut VecDeque<u32>) -> CommandResult<bool> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    while let SessionState::AwaitingSpin { remaining } = session.state() {
        let dice = session.dice();
        print!(
            "[{} left] enter = roll, {}-{} = force total, u = undo, r = reset, q = quit > ",
            remaining,
            dice.min_total(),
            dice.max_total()
        );
        io::stdout().flush()?;

        let line = match lines.next() {
            Some(line) => line?,
            None => return Ok(false),
        };

        match line.trim() {
            "" => take_spin(session, forced.pop_front())?,
            "u" => {
                if !undo(session) {
                    println!("Nothing to undo");
                }
            }
            "r" => {
                session.reset();
                println!("New round");
            }
            "q" => return Ok(false),
            other => match other.parse::<u32>() {
                Ok(total) => {
                    if let Err(e) = spin(session, Some(total)) {
                        println!("{}", e.message());
                    } else if let Some(pick) = session.picks().last() {
                        print_pick(session.picks().len(), pick);
                    }
                }
                Err(_) => println!("Unrecognized input '{}'", other),
            },
        }
    }

    Ok(true)
}

fn take_spin(session: &mut GameSession, forced_total: Option<u32>) -> CommandResult<()> {
    let pick = spin(session, forced_total)?;
    print_pick(session.picks().len(), &pick);
    Ok(())
}

fn print_pick(number: usize, pick: &Pick) {
    let roll = DiceRoll {
        faces: pick.faces.clone(),
        total: pick.roll_value,
        forced: pick.forced,
    };
    println!("Spin {}: {} -> {} bar {}", number, describe_roll(&roll), pick.file_id, pick.bar_index);
}
