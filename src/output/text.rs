use std::fmt::Write as _;
use std::path::PathBuf;

use textwrap::Options;

use crate::app::Result;
use crate::config::{Settings, SinkSettings, DEFAULT_WRAP_WIDTH};
use crate::domain::{Channel, FeedDescriptor};
use crate::output::plain::{fold_punctuation, to_plain_text};
use crate::output::{item_body, save, OutputSink};

const RULE: char = '=';

/// Plain-text report, word-wrapped.
#[derive(Debug)]
pub struct TextSink {
    name: String,
    width: usize,
    show_dates: bool,
    show_authors: bool,
    show_format: bool,
    save_as: Option<PathBuf>,
    save_only: bool,
    buffer: String,
}

impl Default for TextSink {
    fn default() -> Self {
        Self::new()
    }
}

impl TextSink {
    pub fn new() -> Self {
        Self {
            name: "text".into(),
            width: DEFAULT_WRAP_WIDTH,
            show_dates: true,
            show_authors: true,
            show_format: false,
            save_as: None,
            save_only: false,
            buffer: String::new(),
        }
    }

    fn wrapped(&self, text: &str, first: &str, rest: &str) -> String {
        let options = Options::new(self.width)
            .initial_indent(first)
            .subsequent_indent(rest);
        textwrap::fill(text, options)
    }
}

impl OutputSink for TextSink {
    fn init(&mut self, settings: &Settings, sink: &SinkSettings) -> Result<()> {
        self.name = sink.name.clone();
        self.width = sink.wrap_width;
        self.show_dates = settings.show_dates;
        self.show_authors = settings.show_authors;
        self.show_format = settings.show_format;
        self.save_as = sink.save_as.clone();
        self.save_only = sink.save_only;
        self.buffer.clear();
        Ok(())
    }

    fn display(&mut self, channel: Channel, feed: &FeedDescriptor) -> Result<()> {
        let mut out = String::new();
        if !self.buffer.is_empty() {
            out.push('\n');
        }

        let title = fold_punctuation(channel.display_title());
        let _ = writeln!(out, "{}", title);
        let _ = writeln!(out, "{}", RULE.to_string().repeat(title.chars().count().min(self.width)));
        if let Some(link) = &channel.link {
            let _ = writeln!(out, "{}", link);
        }
        if self.show_format {
            let _ = writeln!(out, "({})", channel.format);
        }

        for item in channel.items() {
            out.push('\n');
            let _ = writeln!(
                out,
                "{}",
                self.wrapped(&fold_punctuation(item.display_title()), "* ", "  ")
            );
            if let Some(link) = &item.link {
                let _ = writeln!(out, "  {}", link);
            }

            let mut meta = Vec::new();
            if self.show_authors {
                if let Some(author) = item.first_author() {
                    meta.push(format!("by {}", author));
                }
            }
            if self.show_dates {
                if let Some(date) = item.published_at {
                    meta.push(date.format("%Y-%m-%d %H:%M UTC").to_string());
                }
            }
            if !meta.is_empty() {
                let _ = writeln!(out, "  ({})", meta.join(", "));
            }

            if let Some(body) = item_body(item, feed) {
                let text = to_plain_text(body);
                for para in text.split("\n\n") {
                    out.push('\n');
                    let _ = writeln!(out, "{}", self.wrapped(para, "    ", "    "));
                }
            }
        }

        self.buffer.push_str(&out);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let (Some(path), true) = (&self.save_as, self.has_output()) {
            save(&self.name, path, self.buffer.as_bytes())?;
        }
        Ok(())
    }

    fn content_type(&self) -> &str {
        "text/plain"
    }

    fn has_output(&self) -> bool {
        !self.buffer.is_empty()
    }

    fn generated_output(&self) -> Result<Option<Vec<u8>>> {
        if self.save_only || !self.has_output() {
            return Ok(None);
        }
        Ok(Some(self.buffer.clone().into_bytes()))
    }
}
