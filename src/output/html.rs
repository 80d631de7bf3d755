use std::fmt::Write as _;
use std::path::PathBuf;

use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::app::Result;
use crate::config::{Settings, SinkSettings};
use crate::domain::{Channel, FeedDescriptor};
use crate::output::plain::to_plain_text;
use crate::output::{item_body, save, OutputSink};

const STYLE: &str = "body{font-family:sans-serif;max-width:48em;margin:auto}\
h1{border-bottom:1px solid #ccc}.meta{color:#666;font-size:small}";

/// Standalone HTML report.
#[derive(Debug, Default)]
pub struct HtmlSink {
    name: String,
    show_dates: bool,
    show_authors: bool,
    show_format: bool,
    save_as: Option<PathBuf>,
    save_only: bool,
    body: String,
    document: Option<String>,
}

impl HtmlSink {
    pub fn new() -> Self {
        Self {
            name: "html".into(),
            show_dates: true,
            show_authors: true,
            ..Self::default()
        }
    }

    fn render_document(&self) -> String {
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
             <title>freshet</title>\n<style>{}</style>\n</head>\n<body>\n{}</body>\n</html>\n",
            STYLE, self.body
        )
    }
}

fn link(href: &str, label: &str) -> String {
    format!(
        "<a href=\"{}\">{}</a>",
        encode_double_quoted_attribute(href),
        encode_text(label)
    )
}

impl OutputSink for HtmlSink {
    fn init(&mut self, settings: &Settings, sink: &SinkSettings) -> Result<()> {
        self.name = sink.name.clone();
        self.show_dates = settings.show_dates;
        self.show_authors = settings.show_authors;
        self.show_format = settings.show_format;
        self.save_as = sink.save_as.clone();
        self.save_only = sink.save_only;
        self.body.clear();
        self.document = None;
        Ok(())
    }

    fn display(&mut self, channel: Channel, feed: &FeedDescriptor) -> Result<()> {
        let mut out = String::from("<section class=\"feed\">\n");

        let title = channel.display_title();
        let heading = match &channel.link {
            Some(href) => link(href, title),
            None => encode_text(title).into_owned(),
        };
        let _ = writeln!(out, "<h1>{}</h1>", heading);
        if self.show_format {
            let _ = writeln!(out, "<p class=\"meta\">{}</p>", encode_text(&channel.format));
        }

        out.push_str("<ul>\n");
        for item in channel.items() {
            out.push_str("<li>\n");
            let title = match &item.link {
                Some(href) => link(href, item.display_title()),
                None => encode_text(item.display_title()).into_owned(),
            };
            let _ = writeln!(out, "<p class=\"title\">{}</p>", title);

            let mut meta = Vec::new();
            if self.show_authors {
                if let Some(author) = item.first_author() {
                    meta.push(format!("by {}", encode_text(author)));
                }
            }
            if self.show_dates {
                if let Some(date) = item.published_at {
                    meta.push(date.format("%Y-%m-%d %H:%M UTC").to_string());
                }
            }
            if !meta.is_empty() {
                let _ = writeln!(out, "<p class=\"meta\">{}</p>", meta.join(", "));
            }

            if let Some(body) = item_body(item, feed) {
                for para in to_plain_text(body).split("\n\n").filter(|p| !p.is_empty()) {
                    let _ = writeln!(out, "<p>{}</p>", encode_text(para));
                }
            }
            out.push_str("</li>\n");
        }
        out.push_str("</ul>\n</section>\n");

        self.body.push_str(&out);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if !self.has_output() {
            return Ok(());
        }
        let document = self.render_document();
        if let Some(path) = &self.save_as {
            save(&self.name, path, document.as_bytes())?;
        }
        self.document = Some(document);
        Ok(())
    }

    fn content_type(&self) -> &str {
        "text/html"
    }

    fn has_output(&self) -> bool {
        !self.body.is_empty()
    }

    fn generated_output(&self) -> Result<Option<Vec<u8>>> {
        if self.save_only || !self.has_output() {
            return Ok(None);
        }
        let document = match &self.document {
            Some(document) => document.clone(),
            None => self.render_document(),
        };
        Ok(Some(document.into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Item;

    fn render(channel: Channel) -> String {
        let mut sink = HtmlSink::new();
        sink.init(&Settings::default(), &SinkSettings::new("html"))
            .unwrap();
        sink.display(channel, &FeedDescriptor::parse("https://example.com/").unwrap())
            .unwrap();
        sink.flush().unwrap();
        String::from_utf8(sink.generated_output().unwrap().unwrap()).unwrap()
    }

    #[test]
    fn test_escapes_markup() {
        let mut item = Item::new("https://example.com/");
        item.title = Some("<script>alert(1)</script>".into());
        item.link = Some("https://example.com/?a=1&b=\"2\"".into());
        item.summary = Some("<p>Tom &amp; Jerry</p>".into());
        let mut channel = Channel::new("Atom").with_items(vec![item]);
        channel.title = Some("Cats & Dogs".into());

        let html = render(channel);
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<h1>Cats &amp; Dogs</h1>"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(html.contains("href=\"https://example.com/?a=1&amp;b=&quot;2&quot;\""));
        assert!(html.contains("<p>Tom &amp; Jerry</p>"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_no_output_without_channels() {
        let mut sink = HtmlSink::new();
        sink.init(&Settings::default(), &SinkSettings::new("html"))
            .unwrap();
        sink.flush().unwrap();
        assert!(!sink.has_output());
        assert_eq!(sink.generated_output().unwrap(), None);
    }
}
