//! Operator commands during a live session.
//!
//! The engine sits behind a mutex shared with the session's owner, which
//! takes it out for shutdown on every exit path. Commands lock it only while
//! they touch it, never while waiting for input.

use crate::engine::{Engine, EngineError};
use crate::prompt::LinePrompt;
use chrono::NaiveTime;
use rollcall_core::{ImageLibrary, Ledger, MarkOutcome};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

pub const HELP: &str = "commands: m = mark attendance, a = add person, d = delete person, \
s = sync library, l = list, q = quit";

/// Run `f` on the engine; `None` once it has been shut down.
fn with_engine<T>(engine: &Mutex<Option<Engine>>, f: impl FnOnce(&mut Engine) -> T) -> Option<T> {
    let mut guard = engine.lock().unwrap_or_else(PoisonError::into_inner);
    guard.as_mut().map(f)
}

/// Stop recognition for good. Later calls are no-ops.
pub fn shutdown_engine(engine: &Mutex<Option<Engine>>) -> Result<(), EngineError> {
    let taken = engine.lock().unwrap_or_else(PoisonError::into_inner).take();
    match taken {
        Some(engine) => engine.shutdown().map(drop),
        None => Ok(()),
    }
}

/// Read and execute commands until `q`, end of input, or engine shutdown.
///
/// Ledger, library and store errors are shown to the operator and abort only
/// the command that hit them. Only engine failures end the loop with an error.
pub fn command_loop<R: BufRead, W: Write>(
    engine: &Mutex<Option<Engine>>,
    ledger: &Ledger,
    library: &ImageLibrary,
    prompt: &mut LinePrompt<R, W>,
    clock: impl Fn() -> NaiveTime,
) -> Result<(), EngineError> {
    prompt.say(HELP);

    while let Some(command) = prompt.ask("> ") {
        match command.as_str() {
            "m" | "mark" => {
                let Some(name) = with_engine(engine, |e| {
                    e.latest()
                        .and_then(|s| s.decision.name.clone())
                        .unwrap_or_default()
                }) else {
                    break;
                };
                let outcome = ledger.mark(&name, clock(), |name| {
                    prompt.confirm(&format!("Mark {name} as present?"))
                });
                let message = match outcome {
                    Ok(MarkOutcome::Marked) => format!("{name} marked present"),
                    Ok(MarkOutcome::AlreadyMarked) => format!("{name} is already marked"),
                    Ok(MarkOutcome::OutOfWindow) => {
                        format!("outside the session window {}", ledger.window())
                    }
                    Ok(MarkOutcome::EmptyName) => "no recognized face".to_string(),
                    Ok(MarkOutcome::Declined) => "not marked".to_string(),
                    Ok(MarkOutcome::RequiresConfirmation) => continue,
                    Err(err) => format!("error: {err}"),
                };
                prompt.say(&message);
            }
            "a" | "add" => {
                let (Some(name), Some(photo)) = (prompt.ask("Name: "), prompt.ask("Photo path: ")) else {
                    continue;
                };
                let photo = PathBuf::from(photo);
                let Some(enrolled) = with_engine(engine, |e| {
                    e.paused(|store, recognizer| {
                        store
                            .add_person_from_path(&name, &photo, recognizer.pipeline_mut())
                            .map(|_| ())
                    })
                }) else {
                    break;
                };
                match enrolled? {
                    Ok(()) => {
                        prompt.say(&format!("{} enrolled", name.trim()));
                        if let Err(err) = library.add(&photo, name.trim()) {
                            tracing::warn!(error = %err, "enrolled but could not copy photo to library");
                            prompt.say(&format!("warning: photo not kept in the library: {err}"));
                        }
                    }
                    Err(err) => prompt.say(&format!("error: {err}")),
                }
            }
            "d" | "delete" => {
                let Some(name) = prompt.ask("Name: ") else {
                    continue;
                };
                let Some(removed) = with_engine(engine, |e| e.paused(|store, _| store.remove_person(&name)))
                else {
                    break;
                };
                match removed? {
                    Ok(true) => {
                        prompt.say(&format!("{name} removed"));
                        if let Err(err) = library.remove(&name) {
                            prompt.say(&format!("warning: library photo not deleted: {err}"));
                        }
                    }
                    Ok(false) => prompt.say(&format!("{name} is not enrolled")),
                    Err(err) => prompt.say(&format!("error: {err}")),
                }
            }
            "s" | "sync" => {
                let Some(synced) = with_engine(engine, |e| {
                    e.paused(|store, recognizer| store.sync_from_library(library, recognizer.pipeline_mut()))
                }) else {
                    break;
                };
                match synced? {
                    Ok(report) => {
                        prompt.say(&format!(
                            "enrolled {}, already known {}, failed {}",
                            report.enrolled.len(),
                            report.skipped.len(),
                            report.failed.len()
                        ));
                        for (name, reason) in &report.failed {
                            prompt.say(&format!("  {name}: {reason}"));
                        }
                    }
                    Err(err) => prompt.say(&format!("error: {err}")),
                }
            }
            "l" | "list" => {
                let Some(names) = with_engine(engine, |e| {
                    e.with_store(|store| store.names().map(str::to_string).collect::<Vec<_>>())
                }) else {
                    break;
                };
                prompt.say(&names.join(", "));
            }
            "q" | "quit" => break,
            "" => {}
            _ => prompt.say(HELP),
        }
    }
    Ok(())
}
