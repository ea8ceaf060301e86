use std::collections::{HashMap, HashSet};
use std::io::{self, Write};

use skim_track::{SignalId, SignalView};

#[derive(Debug, Clone, Copy)]
struct Seen {
    active: bool,
    printed: usize,
}

/// Incremental terminal output: carriers appearing and going quiet, and
/// text as it is decoded.
pub struct Renderer {
    center_freq: f64,
    seen: HashMap<SignalId, Seen>,
}

impl Renderer {
    pub fn new(center_freq: f64) -> Self {
        Self {
            center_freq,
            seen: HashMap::new(),
        }
    }

    pub fn update<'a, W, I>(&mut self, out: &mut W, views: I) -> io::Result<()>
    where
        W: Write,
        I: IntoIterator<Item = SignalView<'a>>,
    {
        let mut present = HashSet::new();
        for view in views {
            present.insert(view.id);
            let freq = self.center_freq + view.carrier_freq;
            let seen = self.seen.entry(view.id).or_insert_with(|| Seen {
                active: !view.active,
                printed: 0,
            });

            if seen.active != view.active {
                let mark = match (view.active, view.unreachable) {
                    (true, true) => '!',
                    (true, false) => '+',
                    (false, _) => '-',
                };
                writeln!(out, "{} {:.2} Hz", mark, freq)?;
                seen.active = view.active;
            }

            let text = view.decoded_text;
            if text.len() > seen.printed {
                let fresh = text[seen.printed..].trim_end_matches('\n');
                if !fresh.is_empty() {
                    writeln!(out, "[{:.2}] {}", freq, fresh)?;
                }
                seen.printed = text.len();
            }
        }
        self.seen.retain(|id, _| present.contains(id));
        out.flush()
    }

    /// Every carrier with decoded text, in tracking order.
    pub fn summary<'a, W, I>(&self, out: &mut W, views: I) -> io::Result<()>
    where
        W: Write,
        I: IntoIterator<Item = SignalView<'a>>,
    {
        let views: Vec<SignalView<'a>> = views.into_iter().collect();
        let active = views.iter().filter(|v| v.active).count();
        writeln!(out, "{} carriers tracked, {} active", views.len(), active)?;
        for view in views.iter().filter(|v| !v.decoded_text.is_empty()) {
            writeln!(out, "** {:.2} Hz **", self.center_freq + view.carrier_freq)?;
            writeln!(out, "{}", view.decoded_text.trim_end_matches('\n'))?;
        }
        out.flush()
    }
}
