use crate::pipeline::AuditRun;

pub trait OutputFormatter {
    fn write_run(&self, run: &AuditRun, writer: &mut dyn std::io::Write) -> std::io::Result<()>;
}

/// The report text exactly as rendered.
pub struct TextOutput;

impl OutputFormatter for TextOutput {
    fn write_run(&self, run: &AuditRun, writer: &mut dyn std::io::Write) -> std::io::Result<()> {
        write!(writer, "{}", run.report)?;
        if !run.report.ends_with('\n') {
            writeln!(writer)?;
        }
        Ok(())
    }
}

pub struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn write_run(&self, run: &AuditRun, writer: &mut dyn std::io::Write) -> std::io::Result<()> {
        serde_json::to_writer_pretty(&mut *writer, run)?;
        writeln!(writer)?;
        Ok(())
    }
}

pub fn formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonOutput)
    } else {
        Box::new(TextOutput)
    }
}
