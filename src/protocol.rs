//! Marker payload parsing
//!
//! The side channel embeds FinalTerm-style markers in the output stream.
//! The emulation surface extracts the payload string of each sequence and
//! hands it here together with the cursor's absolute line:
//!
//! - `A` or `A;id=<opaque>` - prompt start (the `id=` form is emitted by
//!   REPL integrations and carries the per-command identity)
//! - `B` - prompt end (fallback completion, no exit code)
//! - `C` - output start
//! - `D` or `D;<code>` - command finished with optional exit code
//! - `R;enter;python` / `R;enter;r` - REPL session entered
//! - `R;exit` - REPL session left
//!
//! Unknown or malformed payloads yield `None` and are ignored by callers.

use crate::block::ReplKind;
use crate::event::MarkerEvent;

/// Parse one marker payload into a typed event.
pub fn parse_marker_payload(payload: &str, line: usize) -> Option<MarkerEvent> {
    let mut parts = payload.split(';');
    let marker = parts.next()?;
    match marker {
        "A" => {
            let repl_command_id = parts
                .next()
                .and_then(|p| p.strip_prefix("id="))
                .filter(|id| !id.is_empty())
                .map(Into::into);
            Some(MarkerEvent::PromptStart {
                line,
                repl_command_id,
            })
        }
        "B" => Some(MarkerEvent::PromptEnd { line }),
        "C" => Some(MarkerEvent::OutputStart { line }),
        "D" => {
            let exit_code = parts.next().and_then(|code| code.parse::<i32>().ok());
            Some(MarkerEvent::Complete { line, exit_code })
        }
        "R" => match parts.next()? {
            "enter" => {
                let kind = match parts.next()? {
                    "python" => ReplKind::Python,
                    "r" => ReplKind::R,
                    _ => return None,
                };
                Some(MarkerEvent::ReplEnter { kind })
            }
            "exit" => Some(MarkerEvent::ReplExit),
            _ => None,
        },
        _ => None,
    }
}
