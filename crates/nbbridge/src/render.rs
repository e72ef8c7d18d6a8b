//! HTML rendering of the notebook cell.
//!
//! The markup mirrors nbconvert's `basic` template closely enough for
//! editors that already style `jp-*` classes: a cell wrapper, the input
//! area with the escaped source, then one output area per output record.

use nbbridge_kernel::{MimeBundle, Notebook, Output, mime_text};

/// Rich output representations in order of preference.
const MIME_PREFERENCE: [&str; 7] = [
    "text/html",
    "image/svg+xml",
    "image/png",
    "image/jpeg",
    "text/markdown",
    "text/latex",
    "text/plain",
];

/// Renders a notebook into the response body sent back to the editor.
pub trait CellRenderer {
    /// Renders the notebook's cell and outputs.
    fn render(&self, notebook: &Notebook) -> String;
}

/// Renders notebooks as HTML fragments.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

impl CellRenderer for HtmlRenderer {
    fn render(&self, notebook: &Notebook) -> String {
        let cell = notebook.cell();
        let mut html = String::from("<div class=\"jp-Cell jp-CodeCell\">\n");

        html.push_str("<div class=\"jp-InputArea\">");
        html.push_str("<div class=\"jp-InputPrompt\">In&nbsp;[");
        if let Some(count) = cell.execution_count() {
            html.push_str(&count.to_string());
        } else {
            html.push_str("&nbsp;");
        }
        html.push_str("]:</div>");
        html.push_str("<pre class=\"jp-InputArea-editor\">");
        html.push_str(&escape(cell.source()));
        html.push_str("</pre></div>\n");

        if !cell.outputs().is_empty() {
            html.push_str("<div class=\"jp-OutputArea\">\n");
            for output in cell.outputs() {
                render_output(&mut html, output);
            }
            html.push_str("</div>\n");
        }

        html.push_str("</div>\n");
        html
    }
}

fn render_output(html: &mut String, output: &Output) {
    match output {
        Output::Stream { name, text } => {
            html.push_str("<div class=\"jp-OutputArea-output jp-RenderedText\" data-mime-type=\"application/vnd.jupyter.");
            html.push_str(if name == "stderr" { "stderr" } else { "stdout" });
            html.push_str("\"><pre>");
            html.push_str(&escape(text));
            html.push_str("</pre></div>\n");
        }
        Output::ExecuteResult {
            execution_count,
            data,
            ..
        } => {
            html.push_str("<div class=\"jp-OutputArea-child jp-OutputArea-executeResult\">");
            html.push_str("<div class=\"jp-OutputPrompt\">Out[");
            if let Some(count) = execution_count {
                html.push_str(&count.to_string());
            }
            html.push_str("]:</div>");
            render_bundle(html, data);
            html.push_str("</div>\n");
        }
        Output::DisplayData { data, .. } => {
            html.push_str("<div class=\"jp-OutputArea-child\">");
            render_bundle(html, data);
            html.push_str("</div>\n");
        }
        Output::Error { traceback, .. } => {
            html.push_str("<div class=\"jp-OutputArea-output jp-RenderedText\" data-mime-type=\"application/vnd.jupyter.stderr\"><pre>");
            let text = traceback.join("\n");
            html.push_str(&escape(&strip_ansi(&text)));
            html.push_str("</pre></div>\n");
        }
    }
}

fn render_bundle(html: &mut String, data: &MimeBundle) {
    let Some((mime, value)) = MIME_PREFERENCE
        .iter()
        .find_map(|mime| data.get(*mime).map(|value| (*mime, value)))
    else {
        return;
    };
    let Some(payload) = mime_text(value) else {
        return;
    };

    match mime {
        "text/html" => {
            html.push_str("<div class=\"jp-OutputArea-output jp-RenderedHTMLCommon\" data-mime-type=\"text/html\">");
            html.push_str(&payload);
            html.push_str("</div>");
        }
        "image/svg+xml" => {
            html.push_str("<div class=\"jp-OutputArea-output jp-RenderedSVG\" data-mime-type=\"image/svg+xml\">");
            html.push_str(&payload);
            html.push_str("</div>");
        }
        "image/png" | "image/jpeg" => {
            html.push_str("<div class=\"jp-OutputArea-output jp-RenderedImage\" data-mime-type=\"");
            html.push_str(mime);
            html.push_str("\"><img src=\"data:");
            html.push_str(mime);
            html.push_str(";base64,");
            html.push_str(payload.trim());
            html.push_str("\"></div>");
        }
        _ => {
            html.push_str("<div class=\"jp-OutputArea-output jp-RenderedText\" data-mime-type=\"");
            html.push_str(mime);
            html.push_str("\"><pre>");
            html.push_str(&escape(&payload));
            html.push_str("</pre></div>");
        }
    }
}

/// Escapes text for inclusion in HTML element content or attributes.
pub(crate) fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Removes ANSI escape sequences (CSI and OSC) from kernel tracebacks.
pub(crate) fn strip_ansi(text: &str) -> String {
    #[derive(Clone, Copy)]
    enum State {
        Text,
        Escape,
        Csi,
        Osc,
        OscEscape,
    }

    let mut stripped = String::with_capacity(text.len());
    let mut state = State::Text;
    for ch in text.chars() {
        state = match (state, ch) {
            (State::Text, '\u{1b}') => State::Escape,
            (State::Text, _) => {
                stripped.push(ch);
                State::Text
            }
            (State::Escape, '[') => State::Csi,
            (State::Escape, ']') => State::Osc,
            (State::Escape, _) => State::Text,
            // CSI sequences end with a byte in `@`..=`~`.
            (State::Csi, '@'..='~') => State::Text,
            (State::Csi, _) => State::Csi,
            (State::Osc, '\u{7}') => State::Text,
            (State::Osc, '\u{1b}') => State::OscEscape,
            (State::Osc, _) => State::Osc,
            (State::OscEscape, _) => State::Text,
        };
    }
    stripped
}
