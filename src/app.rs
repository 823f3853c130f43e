use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;

use crate::catalog::Catalog;
use crate::config;
use crate::dwell::{self, DwellTimer};
use crate::feed::FeedEntry;
use crate::session::{self, FeedHandle};

#[derive(Debug, Clone, Default)]
pub struct BrowseOptions {
    pub config_file: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
    pub start: Option<String>,
}

pub fn run(options: BrowseOptions) -> Result<()> {
    let cfg = config::load(config::LoadOptions {
        config_file: options.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;

    let catalog_path = options
        .catalog
        .clone()
        .or_else(|| cfg.catalog.path.clone())
        .context("no catalog given; pass --catalog or set catalog.path in the config")?;
    let catalog = Catalog::load(&catalog_path)?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut browser = Browser::open(catalog, &cfg, options.start.as_deref())?;
    browser.run(stdin.lock(), stdout.lock())
}

/// Line-driven host: each command moves focus and prints the focused entry.
pub struct Browser {
    manager: session::Manager,
    session_id: u64,
    feed: FeedHandle,
    policy: dwell::Policy,
    position: usize,
    address: Arc<Mutex<Option<String>>>,
    timer: Option<(usize, DwellTimer)>,
}

impl Browser {
    pub fn open(catalog: Catalog, cfg: &config::Config, start: Option<&str>) -> Result<Self> {
        let address = Arc::new(Mutex::new(None));
        let sink = address.clone();
        let manager = session::Manager::new(catalog, cfg.feed_config())
            .with_reporter(Arc::new(move |id: &str| *sink.lock() = Some(format!("/{id}"))));
        let (session_id, feed) = manager.open(start).context("open feed session")?;
        Ok(Self {
            manager,
            session_id,
            feed,
            policy: cfg.dwell_policy(),
            position: 0,
            address,
            timer: None,
        })
    }

    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut out: W) -> Result<()> {
        self.focus(0, &mut out)?;
        for line in input.lines() {
            let line = line.context("read command")?;
            match line.trim() {
                "n" | "next" | "j" => self.step(true, &mut out)?,
                "p" | "prev" | "k" => self.step(false, &mut out)?,
                "w" | "wait" => self.wait(&mut out)?,
                "s" | "status" => self.status(&mut out)?,
                "q" | "quit" => break,
                "" => {}
                other => writeln!(out, "unknown command {other:?} (n, p, w, s, q)")?,
            }
        }
        self.close();
        Ok(())
    }

    fn step<W: Write>(&mut self, forward: bool, out: &mut W) -> Result<()> {
        if self.feed.lock().gate_state().is_locked() {
            let secs = self
                .timer
                .as_ref()
                .and_then(|(_, timer)| timer.remaining_secs())
                .unwrap_or(0);
            writeln!(out, "Wait {secs} seconds to continue...")?;
            return Ok(());
        }

        let target = if forward {
            self.position + 1
        } else if let Some(prev) = self.position.checked_sub(1) {
            prev
        } else {
            writeln!(out, "already at the first entry")?;
            return Ok(());
        };
        if target >= self.feed.lock().len() {
            writeln!(out, "end of feed")?;
            return Ok(());
        }
        self.focus(target, out)
    }

    fn focus<W: Write>(&mut self, index: usize, out: &mut W) -> Result<()> {
        self.position = index;
        let (change, entry) = {
            let mut feed = self.feed.lock();
            let change = feed.on_focus_changed(index);
            (change, feed.get(index).cloned())
        };

        match entry {
            Some(FeedEntry::Content(content)) => {
                let address = self.address.lock().clone().unwrap_or_default();
                writeln!(
                    out,
                    "#{} {} {} {}",
                    content.position + 1,
                    content.item.id,
                    address,
                    content.item.img
                )?;
            }
            Some(FeedEntry::Interstitial(ad)) => {
                writeln!(out, "[{}] Advertisement", ad.slot())?;
                if change.gate.is_locked() {
                    self.start_dwell(ad.index);
                    let secs = self
                        .timer
                        .as_ref()
                        .and_then(|(_, timer)| timer.remaining_secs())
                        .unwrap_or(0);
                    writeln!(out, "Wait {secs} seconds to continue...")?;
                }
            }
            None => {}
        }
        if !change.appended.is_empty() {
            tracing::debug!(appended = change.appended.len(), "feed extended");
        }
        Ok(())
    }

    fn start_dwell(&mut self, interstitial: usize) {
        if matches!(self.timer, Some((idx, _)) if idx == interstitial) {
            return;
        }
        let mut timer = DwellTimer::new(self.policy);
        // the terminal shows the whole entry at once
        timer.observe_visibility(1.0, self.feed.viewed_signal(interstitial));
        self.timer = Some((interstitial, timer));
    }

    fn wait<W: Write>(&mut self, out: &mut W) -> Result<()> {
        match self.timer.as_mut() {
            Some((_, timer)) if !timer.is_complete() => {
                timer.wait();
                writeln!(out, "You can continue now.")?;
            }
            _ => writeln!(out, "nothing to wait for")?,
        }
        Ok(())
    }

    fn status<W: Write>(&mut self, out: &mut W) -> Result<()> {
        let feed = self.feed.lock();
        writeln!(
            out,
            "entry {}/{} gate {} interstitials {}",
            self.position + 1,
            feed.len(),
            feed.gate_state(),
            feed.interstitial_len()
        )?;
        let hints = feed.preload_hints(self.position, 2);
        if !hints.is_empty() {
            writeln!(out, "preloading {}", hints.join(" "))?;
        }
        Ok(())
    }

    fn close(&mut self) {
        self.timer = None;
        if let Err(err) = self.manager.close(self.session_id) {
            tracing::warn!("closing session failed: {err:?}");
        }
    }
}
