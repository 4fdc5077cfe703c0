use clap::{Parser, Subcommand};
use drill_core::*;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "drill")]
#[command(about = "Vocabulary exercise session runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a session over exercises from a JSON file
    Run {
        /// Exercise payload (bare array or {session_id, exercises})
        #[arg(long)]
        exercises: PathBuf,

        /// Session mode (detection, practice)
        #[arg(long, default_value = "practice")]
        mode: String,

        /// Backend session id, overrides the one in the payload
        #[arg(long)]
        session_id: Option<u64>,

        /// Practice category recorded with progress
        #[arg(long)]
        category: Option<String>,

        /// Fire scheduled advances without waiting (for testing)
        #[arg(long)]
        instant: bool,
    },

    /// Show the resolved mode policy
    Policy {
        /// Only this mode
        #[arg(long)]
        mode: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    drill_core::logging::init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Run {
            exercises,
            mode,
            session_id,
            category,
            instant,
        } => {
            let mode: SessionMode = mode.parse()?;
            cmd_run(exercises, mode, session_id, category, instant, &config).await
        }
        Commands::Policy { mode } => {
            let modes = match mode {
                Some(m) => vec![m.parse()?],
                None => vec![SessionMode::Detection, SessionMode::Practice],
            };
            for mode in modes {
                display_policy(&ModePolicy::from_config(mode, &config));
            }
            Ok(())
        }
    }
}

async fn cmd_run(
    path: PathBuf,
    mode: SessionMode,
    session_id: Option<u64>,
    category: Option<String>,
    instant: bool,
    config: &Config,
) -> Result<()> {
    let contents = std::fs::read_to_string(&path)?;
    let mut batch = ExerciseBatch::from_json(&contents)?;
    batch.session_id = Some(session_id.or(batch.session_id).unwrap_or(1));
    tracing::info!("Loaded {} exercises from {:?}", batch.exercises.len(), path);

    let backend: SharedApi = Arc::new(LocalBackend::from_batch(batch));
    let registry = SessionRegistry::new();
    let label = category.clone().unwrap_or_else(|| "general".to_string());
    let mut session = ExerciseSession::load(
        backend,
        registry,
        ModePolicy::from_config(mode, config),
        &label,
        category,
    )
    .await?;

    println!(
        "Starting {} session with {} exercises",
        mode,
        session.exercises().len()
    );

    let mut events = session.begin();
    loop {
        let mut pending = None;
        let mut finished = false;
        for event in &events {
            match event {
                EngineEvent::Feedback(message) => println!("  {}", message),
                EngineEvent::PhaseChanged(SessionPhase::Review) => println!("\n-- Review --"),
                EngineEvent::AdvanceScheduled { timer, delay } => pending = Some((*timer, *delay)),
                EngineEvent::Completed => finished = true,
                _ => {}
            }
        }

        if finished {
            let view = session.view();
            println!(
                "\n✓ Session complete! ({}/{})",
                view.progress_info.current, view.progress_info.total
            );
            session.close();
            break;
        }

        if let Some((timer, delay)) = pending {
            if !instant {
                tokio::time::sleep(delay).await;
            }
            events = session.fire_timer(timer);
            continue;
        }

        let Some(index) = session.view().current_index else {
            break;
        };
        display_exercise(&session, index);

        events = match read_line()?.as_deref().map(str::trim) {
            Some(":skip") => session.continue_to_next(),
            Some(":tick") => session.tick(),
            Some(":quit") | None => {
                if handle_exit(&mut session).await? {
                    break;
                }
                Vec::new()
            }
            Some(answer) => {
                let report = session.answer(index, answer).await;
                if let Some(change) = report.mastery {
                    display_mastery_change(&change);
                    session.dismiss_mastery_change();
                }
                report.events
            }
        };
    }

    Ok(())
}

/// Returns true once the session is closed
async fn handle_exit(session: &mut ExerciseSession) -> Result<bool> {
    let check = session.request_exit().await;
    match &check {
        ExitCheck::AlreadyComplete => {
            println!("Session already complete.");
            return Ok(true);
        }
        ExitCheck::AlreadyAbandoned | ExitCheck::Untracked => {
            println!("Session closed.");
            return Ok(true);
        }
        ExitCheck::InProgress => return Ok(false),
        ExitCheck::Confirm(consequence) => {
            if let Some(ref warning) = consequence.warning_message {
                println!("\n⚠ {}", warning);
            }
            for word in consequence.degrading_words() {
                println!(
                    "  {} ({}): level {} → {}",
                    word.word, word.spanish, word.current_level, word.potential_new_level
                );
            }
        }
        ExitCheck::ConfirmGeneric => {
            println!("\n⚠ Leaving now may count unsolved words as failures.");
        }
    }

    print!("Abandon this session? [y/N] ");
    io::stdout().flush()?;
    // Closed input means the learner is leaving
    let confirmed = read_line()?.map_or(true, |line| line.trim().eq_ignore_ascii_case("y"));
    if !confirmed {
        session.cancel_exit();
        return Ok(false);
    }

    loop {
        match session.confirm_abandon().await {
            AbandonOutcome::Abandoned => {
                println!("Session abandoned.");
                return Ok(true);
            }
            AbandonOutcome::AlreadyComplete => {
                println!("Session already complete.");
                return Ok(true);
            }
            AbandonOutcome::Failed(e) => {
                println!("Could not abandon session: {}", e);
                print!("[r]etry, [c]ancel, [f]orce exit: ");
                io::stdout().flush()?;
                match read_line()?.as_deref().map(str::trim) {
                    Some("r") => continue,
                    Some("c") => {
                        session.cancel_exit();
                        return Ok(false);
                    }
                    _ => {
                        session.force_exit();
                        println!("Left without saving.");
                        return Ok(true);
                    }
                }
            }
        }
    }
}

fn read_line() -> Result<Option<String>> {
    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    Ok(Some(input))
}

fn display_exercise(session: &ExerciseSession, index: usize) {
    let Some(exercise) = session.exercises().get(index) else {
        return;
    };
    let view = session.view();

    println!("─────────────────────────────────────────");
    println!(
        "[{}/{}] {}",
        view.progress_info.current,
        view.progress_info.total,
        exercise.question.as_deref().unwrap_or_default()
    );

    if let Some(ref distractors) = exercise.distractors {
        let mut options: Vec<&str> = distractors.iter().map(String::as_str).collect();
        if let Some(ref answer) = exercise.answer {
            options.push(answer);
        }
        options.sort_unstable();
        println!("  Options: {}", options.join(", "));
    }
    if view.attempts_info.current > 0 {
        println!("  Attempts left: {}", view.attempts_info.remaining);
    }
    if let Some(secs) = session.countdown_remaining() {
        println!("  ⏱ {}s", secs);
    }
    print!("> ");
    let _ = io::stdout().flush();
}

fn display_mastery_change(change: &MasteryChangeEvent) {
    let marker = match change.change_type {
        ChangeType::Increase => "★",
        ChangeType::Decrease => "☆",
    };
    println!(
        "  {} {} ({}): {} → {}",
        marker, change.word, change.word_translation, change.previous_level, change.new_level
    );
    if let Some(ref message) = change.message {
        println!("    {}", message);
    }
}

fn display_policy(policy: &ModePolicy) {
    println!("{}", policy.mode);
    println!("  max_attempts: {}", policy.max_attempts);
    println!("  review_attempts: {}", policy.review_attempts);
    println!("  new_word_protection_days: {}", policy.new_word_protection_days);
    println!(
        "  min_exercises_before_degradation: {}",
        policy.min_exercises_before_degradation
    );
    println!(
        "  suppress_incorrect_feedback: {}",
        policy.suppress_incorrect_feedback
    );
    println!("  correct_delay: {}", format_delay(policy.correct_delay));
    println!("  exhausted_delay: {}", format_delay(policy.exhausted_delay));
    println!("  degraded_delay: {}", format_delay(policy.degraded_delay));
    match &policy.feedback {
        FeedbackFilter::PassThrough => println!("  feedback: all"),
        FeedbackFilter::AllowList(markers) => {
            println!("  feedback: only messages containing {:?}", markers)
        }
    }
}

fn format_delay(delay: Duration) -> String {
    format!("{}ms", delay.as_millis())
}
