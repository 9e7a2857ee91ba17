//! Progress output for `storyflow generate`
//!
//! Narrative items are printed as soon as the stream completes them, so the
//! user sees stories before the flow has finished generating.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use storyflow_orchestrator::{GenerationEvent, NotificationSink};

/// Prints newly completed narrative items to a writer (stderr in the CLI).
pub struct ProgressPrinter<W> {
    state: Mutex<PrinterState<W>>,
}

struct PrinterState<W> {
    out: W,
    printed: usize,
}

impl<W: Write + Send> ProgressPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            state: Mutex::new(PrinterState { out, printed: 0 }),
        }
    }

    pub fn into_inner(self) -> W {
        self.state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .out
    }
}

impl<W: Write + Send> NotificationSink for ProgressPrinter<W> {
    fn notify(&self, event: GenerationEvent) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let PrinterState { out, printed } = &mut *state;

        // Write errors on a progress stream are not worth failing the run for.
        let _ = match event {
            GenerationEvent::Progress {
                narrative_items, ..
            } => {
                // A shorter list means a new attempt started streaming.
                if narrative_items.len() < *printed {
                    *printed = 0;
                    let _ = writeln!(out, "  ... retrying with corrective instructions");
                }
                for (index, item) in narrative_items.iter().enumerate().skip(*printed) {
                    let _ = writeln!(out, "  story {}: {item}", index + 1);
                }
                *printed = (*printed).max(narrative_items.len());
                out.flush()
            }
            GenerationEvent::Completed { artifact, .. } => writeln!(
                out,
                "✓ {} stories, {} nodes, {} edges (confidence {:.2})",
                artifact.narrative_items.len(),
                artifact.graph.nodes.len(),
                artifact.graph.edges.len(),
                artifact.confidence
            ),
            // The error itself is reported by the command
            GenerationEvent::Failed { .. } => Ok(()),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(items: &[&str]) -> GenerationEvent {
        GenerationEvent::Progress {
            subject_id: "s1".to_string(),
            narrative_items: items.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[test]
    fn test_prints_each_item_once() {
        let printer = ProgressPrinter::new(Vec::new());
        printer.notify(progress(&[]));
        printer.notify(progress(&["first"]));
        printer.notify(progress(&["first", "second"]));
        printer.notify(progress(&["first", "second"]));

        let out = String::from_utf8(printer.into_inner()).unwrap();
        assert_eq!(out, "  story 1: first\n  story 2: second\n");
    }

    #[test]
    fn test_restarted_stream_prints_again() {
        let printer = ProgressPrinter::new(Vec::new());
        printer.notify(progress(&["a", "b"]));
        printer.notify(progress(&["c"]));

        let out = String::from_utf8(printer.into_inner()).unwrap();
        assert!(out.contains("retrying"));
        assert!(out.ends_with("  story 1: c\n"));
    }

    #[test]
    fn test_failure_prints_nothing() {
        let printer = ProgressPrinter::new(Vec::new());
        printer.notify(GenerationEvent::Failed {
            subject_id: "s1".to_string(),
            error: "boom".to_string(),
        });
        assert!(printer.into_inner().is_empty());
    }
}
