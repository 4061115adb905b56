//! JUnit XML output for CI.

use crate::types::{CaseStatus, Summary};
use anyhow::Result;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::io::Write;
use std::time::Duration;

fn serialize_time(tag: &mut BytesStart, duration: Duration) {
    tag.push_attribute(("time", format!("{:.3}", duration.as_secs_f64()).as_str()));
}

fn serialize_text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn serialize_suite<W: Write>(writer: &mut Writer<W>, summary: &Summary) -> Result<()> {
    let mut suite_tag = BytesStart::new("testsuite");
    suite_tag.extend_attributes([
        ("name", summary.name.as_str()),
        ("tests", summary.total.to_string().as_str()),
        ("failures", summary.failed.to_string().as_str()),
        ("errors", "0"),
        ("skipped", summary.skipped.to_string().as_str()),
    ]);
    serialize_time(&mut suite_tag, summary.duration);
    writer.write_event(Event::Start(suite_tag))?;

    for case in &summary.cases {
        let mut case_tag = BytesStart::new("testcase");
        case_tag.extend_attributes([
            ("name", case.name.as_str()),
            ("classname", format!("{}.{}", summary.name, case.module).as_str()),
        ]);
        serialize_time(&mut case_tag, case.duration);
        let message = case.message.as_deref().unwrap_or_default();
        match case.status {
            CaseStatus::Passed if case.output.is_empty() => {
                writer.write_event(Event::Empty(case_tag))?;
                continue;
            }
            _ => writer.write_event(Event::Start(case_tag))?,
        }
        match case.status {
            CaseStatus::Failed => {
                let mut failure = BytesStart::new("failure");
                failure.push_attribute(("message", message));
                writer.write_event(Event::Start(failure))?;
                writer.write_event(Event::Text(BytesText::new(message)))?;
                writer.write_event(Event::End(BytesEnd::new("failure")))?;
            }
            CaseStatus::Skipped => {
                let mut skip = BytesStart::new("skipped");
                skip.push_attribute(("message", message));
                writer.write_event(Event::Empty(skip))?;
            }
            CaseStatus::Passed => {}
        }
        if !case.output.is_empty() {
            serialize_text_element(writer, "system-out", &case.output)?;
        }
        writer.write_event(Event::End(BytesEnd::new("testcase")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    Ok(())
}

/// Writes one `<testsuites>` document with a `<testsuite>` per summary.
pub fn write_junit<W: Write>(out: W, name: &str, summaries: &[Summary]) -> Result<()> {
    let mut writer = Writer::new_with_indent(out, b' ', 4);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let tests: usize = summaries.iter().map(|s| s.total).sum();
    let failures: usize = summaries.iter().map(|s| s.failed).sum();
    let skipped: usize = summaries.iter().map(|s| s.skipped).sum();
    let duration: Duration = summaries.iter().map(|s| s.duration).sum();

    let mut root = BytesStart::new("testsuites");
    root.extend_attributes([
        ("name", name),
        ("tests", tests.to_string().as_str()),
        ("failures", failures.to_string().as_str()),
        ("errors", "0"),
        ("skipped", skipped.to_string().as_str()),
    ]);
    serialize_time(&mut root, duration);
    writer.write_event(Event::Start(root))?;
    for summary in summaries {
        serialize_suite(&mut writer, summary)?;
    }
    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;
    writer.write_indent()?;
    Ok(())
}

pub fn render_junit(name: &str, summaries: &[Summary]) -> Result<String> {
    let mut buf = Vec::new();
    write_junit(&mut buf, name, summaries)?;
    Ok(String::from_utf8(buf)?)
}
