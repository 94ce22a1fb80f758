//! Notebook → markdown fragment.
//!
//! Cell source is left out by default: the report is about results. Outputs
//! are emitted in document order, each kind with a fixed layout.

use nbdigest_core::text::strip_ansi;
use nbdigest_core::{Cell, DisplayData, ErrorOutput, ExecuteResult, MimeBundle, Notebook, Output};

/// Rendering switches.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Emit each code cell's source in a fenced block before its outputs.
    pub include_source: bool,
}

/// Heading line used for failed or incomplete executions.
pub const FAILURE_WARNING: &str = "**Warning: Notebook execution failed or incomplete.**";

/// Render an executed notebook.
///
/// `failure` is shown as a warning directly under the title; rendering of
/// whatever cells did run continues regardless.
pub fn render_notebook(
    notebook: &Notebook,
    display_name: &str,
    failure: Option<&str>,
    options: &RenderOptions,
) -> String {
    let mut pieces = vec![format!("# {}\n", display_name)];

    if let Some(message) = failure {
        pieces.push(warning_block(message));
    }

    for cell in &notebook.cells {
        match cell {
            Cell::Markdown(markdown) => pieces.push(format!("{}\n", markdown.source)),
            Cell::Code(code) => {
                if options.include_source && !code.source.trim().is_empty() {
                    pieces.push(fenced(notebook.language(), &code.source));
                }
                pieces.extend(code.outputs.iter().flat_map(render_output));
            }
            Cell::Raw(_) => {}
        }
    }

    pieces.join("\n")
}

/// Markdown pieces for one output; empty when there is nothing worth showing.
pub fn render_output(output: &Output) -> Vec<String> {
    match output {
        Output::Stream(stream) => text_block(&stream.text).into_iter().collect(),
        Output::ExecuteResult(result) => render_execute_result(result).into_iter().collect(),
        Output::DisplayData(display) => render_display_data(display).into_iter().collect(),
        Output::Error(error) => render_error(error),
    }
}

/// Only `text/plain` is read; richer representations are ignored.
fn render_execute_result(result: &ExecuteResult) -> Option<String> {
    text_block(&result.data.text(MimeBundle::TEXT_PLAIN)?)
}

/// PNG beats text when both exist.
fn render_display_data(display: &DisplayData) -> Option<String> {
    if let Some(png) = display.data.text(MimeBundle::IMAGE_PNG) {
        let png: String = png.chars().filter(|c| !matches!(c, '\n' | '\r')).collect();
        return Some(format!("![Chart](data:image/png;base64,{})\n", png));
    }
    text_block(&display.data.text(MimeBundle::TEXT_PLAIN)?)
}

/// Summary line plus a collapsible traceback, even when the traceback is empty.
fn render_error(error: &ErrorOutput) -> Vec<String> {
    let traceback = strip_ansi(&error.traceback.join("\n")).into_owned();
    let fence = fence_for(&traceback);

    vec![
        format!(
            "❌ **Error**: `{}`: {}\n",
            error.ename,
            strip_ansi(&error.evalue)
        ),
        format!(
            "<details><summary>Traceback</summary>\n\n{fence}text\n{traceback}\n{fence}\n\n</details>\n"
        ),
    ]
}

/// Fenced `text` block, or nothing for blank text.
fn text_block(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }
    Some(fenced("text", text))
}

fn fenced(info: &str, body: &str) -> String {
    let fence = fence_for(body);
    format!("{fence}{info}\n{body}\n{fence}\n")
}

/// Three backticks, or one more than the longest backtick run in `body`.
fn fence_for(body: &str) -> String {
    let longest = body
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}

/// Blockquote the failure message line by line.
fn warning_block(message: &str) -> String {
    let quoted: Vec<String> = message
        .trim_end()
        .lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_string()
            } else {
                format!("> {}", line)
            }
        })
        .collect();
    format!("{}\n{}\n", FAILURE_WARNING, quoted.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbdigest_core::{CodeCell, MarkdownCell, RawCell, StreamOutput};

    fn markdown(source: &str) -> Cell {
        Cell::Markdown(MarkdownCell {
            source: source.to_string(),
        })
    }

    fn code_with(outputs: Vec<Output>) -> Cell {
        Cell::Code(CodeCell {
            source: "hidden_source()".to_string(),
            outputs,
            execution_count: Some(1),
        })
    }

    fn stream(text: &str) -> Output {
        Output::Stream(StreamOutput {
            name: "stdout".to_string(),
            text: text.to_string(),
        })
    }

    fn result(text: &str) -> Output {
        Output::ExecuteResult(ExecuteResult {
            data: [(MimeBundle::TEXT_PLAIN, text)].into_iter().collect(),
            ..Default::default()
        })
    }

    fn display(pairs: &[(&str, &str)]) -> Output {
        Output::DisplayData(DisplayData {
            data: pairs.iter().copied().collect(),
            ..Default::default()
        })
    }

    fn error(ename: &str, evalue: &str, traceback: &[&str]) -> Output {
        Output::Error(ErrorOutput {
            ename: ename.to_string(),
            evalue: evalue.to_string(),
            traceback: traceback.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn render(cells: Vec<Cell>, failure: Option<&str>) -> String {
        let notebook = Notebook {
            cells,
            ..Default::default()
        };
        render_notebook(&notebook, "model", failure, &RenderOptions::default())
    }

    #[test]
    fn test_title_only() {
        assert_eq!(render(vec![], None), "# model\n");
    }

    #[test]
    fn test_markdown_is_verbatim() {
        let out = render(vec![markdown("Some *raw* <b>markdown</b> | table")], None);
        assert_eq!(out, "# model\n\nSome *raw* <b>markdown</b> | table\n");
    }

    #[test]
    fn test_stream_is_fenced() {
        let out = render(vec![code_with(vec![stream("ok\n")])], None);
        assert_eq!(out, "# model\n\n```text\nok\n\n```\n");
    }

    #[test]
    fn test_code_source_is_hidden_by_default() {
        let out = render(vec![code_with(vec![stream("ok\n")])], None);
        assert!(!out.contains("hidden_source"));
    }

    #[test]
    fn test_include_source_option() {
        let notebook = Notebook {
            cells: vec![code_with(vec![stream("ok\n")])],
            ..Default::default()
        };
        let options = RenderOptions {
            include_source: true,
        };
        let out = render_notebook(&notebook, "model", None, &options);

        let source_at = out.find("```python\nhidden_source()\n```").unwrap();
        let output_at = out.find("```text\nok").unwrap();
        assert!(source_at < output_at);
    }

    #[test]
    fn test_blank_payloads_are_skipped() {
        let out = render(
            vec![code_with(vec![
                stream("   \n\t"),
                result(""),
                display(&[(MimeBundle::TEXT_PLAIN, "  ")]),
            ])],
            None,
        );
        assert_eq!(out, "# model\n");
        assert!(!out.contains("```"));
    }

    #[test]
    fn test_execute_result_reads_only_text_plain() {
        let rich = Output::ExecuteResult(ExecuteResult {
            data: [("text/html", "<table></table>")].into_iter().collect(),
            ..Default::default()
        });
        assert!(render_output(&rich).is_empty());

        let both = Output::ExecuteResult(ExecuteResult {
            data: [("text/html", "<b>42</b>"), (MimeBundle::TEXT_PLAIN, "42")]
                .into_iter()
                .collect(),
            ..Default::default()
        });
        assert_eq!(render_output(&both), vec!["```text\n42\n```\n"]);
    }

    #[test]
    fn test_image_wins_over_text() {
        let out = render_output(&display(&[
            (MimeBundle::IMAGE_PNG, "iVBOR\nw0KGgo=\n"),
            (MimeBundle::TEXT_PLAIN, "<Figure size 640x480>"),
        ]));
        assert_eq!(out, vec!["![Chart](data:image/png;base64,iVBORw0KGgo=)\n"]);
    }

    #[test]
    fn test_display_text_fallback_and_nothing() {
        assert_eq!(
            render_output(&display(&[(MimeBundle::TEXT_PLAIN, "summary")])),
            vec!["```text\nsummary\n```\n"]
        );
        assert!(render_output(&display(&[("text/html", "<p>only html</p>")])).is_empty());
    }

    #[test]
    fn test_error_renders_summary_and_traceback() {
        let out = render_output(&error("ValueError", "bad input", &["line1", "line2"]));
        assert_eq!(
            out,
            vec![
                "❌ **Error**: `ValueError`: bad input\n".to_string(),
                "<details><summary>Traceback</summary>\n\n```text\nline1\nline2\n```\n\n</details>\n"
                    .to_string(),
            ]
        );
    }

    #[test]
    fn test_error_with_empty_traceback_keeps_empty_block() {
        let out = render_output(&error("KeyError", "'x'", &[]));
        assert_eq!(out.len(), 2);
        assert!(out[1].contains("```text\n\n```"));
    }

    #[test]
    fn test_error_strips_terminal_colours() {
        let out = render_output(&error(
            "ZeroDivisionError",
            "division by zero",
            &["\x1b[0;31mZeroDivisionError\x1b[0m: division by zero"],
        ));
        assert!(!out.concat().contains('\x1b'));
        assert!(out[1].contains("ZeroDivisionError: division by zero"));
    }

    #[test]
    fn test_warning_comes_right_after_title() {
        let out = render(
            vec![markdown("# Intro"), code_with(vec![stream("ok\n")])],
            Some("Kernel died\nwhile running"),
        );
        let expected_start = format!("# model\n\n{}\n> Kernel died\n> while running\n", FAILURE_WARNING);
        assert!(out.starts_with(&expected_start), "{}", out);
        assert!(out.find("# Intro").unwrap() > expected_start.len() - 1);
    }

    #[test]
    fn test_warning_blank_lines_stay_in_quote() {
        let block = warning_block("first\n\nsecond\n");
        assert_eq!(block, format!("{}\n> first\n>\n> second\n", FAILURE_WARNING));
    }

    #[test]
    fn test_order_is_preserved_without_dedup() {
        let out = render(
            vec![
                markdown("A"),
                code_with(vec![stream("same\n"), stream("same\n"), result("r1")]),
                markdown("B"),
                code_with(vec![result("r2")]),
            ],
            None,
        );
        let positions: Vec<usize> = ["A\n", "same", "r1", "B\n", "r2"]
            .iter()
            .map(|needle| out.find(needle).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{}", out);
        assert_eq!(out.matches("```text\nsame\n").count(), 2);
    }

    #[test]
    fn test_raw_cells_are_not_rendered() {
        let out = render(
            vec![Cell::Raw(RawCell {
                source: "\\begin{raw}".to_string(),
            })],
            None,
        );
        assert_eq!(out, "# model\n");
    }

    #[test]
    fn test_fence_grows_past_embedded_backticks() {
        let block = text_block("before\n```\ninside\n```\nafter").unwrap();
        assert!(block.starts_with("````text\n"));
        assert!(block.ends_with("\n````\n"));
    }
}
