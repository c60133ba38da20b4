use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use wizrun_core::args::{ArgList, ArgSpec};
use wizrun_core::error::{Result, WizardError};
use wizrun_core::traits::{ProgressSink, Step, StepContext};
use wizrun_core::types::{ProgressLevel, FILENAME_TYPE};
use wizrun_core::value::Value;

const VALUE_ARG: &str = "Value";
const FILENAME_ARG: &str = "Filename";
const TEXT_ARG: &str = "Text";
const STRING_TYPE: &str = "string";

/// Progress handle bound on the inputs, or the run's sink.
fn progress_of(inputs: &ArgList, ctx: &StepContext) -> Arc<dyn ProgressSink> {
    inputs.progress().unwrap_or_else(|| ctx.progress.clone())
}

fn required_path(step: &str, inputs: &ArgList) -> Result<PathBuf> {
    match inputs.value(FILENAME_ARG) {
        Some(Value::Path(p)) => Ok(p.clone()),
        Some(Value::Literal(serde_json::Value::String(s))) => Ok(PathBuf::from(s)),
        Some(other) => Err(WizardError::step_failed(
            step,
            format!("{} is not a file name", other.describe()),
        )),
        None => Err(WizardError::step_failed(step, "no file name was provided")),
    }
}

/// Reports its input value through the progress sink.
#[derive(Default)]
pub struct PrintValueStep;

impl Step for PrintValueStep {
    fn name(&self) -> &str {
        "Print Value"
    }

    fn input_spec(&self) -> ArgSpec {
        ArgSpec::new().progress().arg(VALUE_ARG, STRING_TYPE)
    }

    fn output_spec(&self) -> ArgSpec {
        ArgSpec::new()
    }

    fn execute<'a>(
        &'a self,
        ctx: StepContext,
        inputs: &'a ArgList,
        _outputs: &'a mut ArgList,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let progress = progress_of(inputs, &ctx);
            let text = inputs
                .value(VALUE_ARG)
                .map(Value::describe)
                .unwrap_or_default();
            progress.update_progress(&text, 100, ProgressLevel::Normal);
            Ok(())
        })
    }
}

/// Reads a UTF-8 file into the `Text` output.
#[derive(Default)]
pub struct ReadTextFileStep;

impl Step for ReadTextFileStep {
    fn name(&self) -> &str {
        "Read Text File"
    }

    fn input_spec(&self) -> ArgSpec {
        ArgSpec::new().progress().arg(FILENAME_ARG, FILENAME_TYPE)
    }

    fn output_spec(&self) -> ArgSpec {
        ArgSpec::new().arg(TEXT_ARG, STRING_TYPE)
    }

    fn execute<'a>(
        &'a self,
        ctx: StepContext,
        inputs: &'a ArgList,
        outputs: &'a mut ArgList,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let path = required_path(self.name(), inputs)?;
            debug!(path = %path.display(), "Reading text file");

            let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
                WizardError::step_failed(self.name(), format!("{}: {}", path.display(), e))
            })?;

            progress_of(inputs, &ctx).update_progress(
                &format!("Read {} bytes from {}", text.len(), path.display()),
                100,
                ProgressLevel::Normal,
            );
            outputs.set(TEXT_ARG, Value::literal(text));
            Ok(())
        })
    }
}

/// Writes the `Text` input to a file, creating parent directories.
#[derive(Default)]
pub struct WriteTextFileStep;

impl Step for WriteTextFileStep {
    fn name(&self) -> &str {
        "Write Text File"
    }

    fn input_spec(&self) -> ArgSpec {
        ArgSpec::new()
            .progress()
            .arg(FILENAME_ARG, FILENAME_TYPE)
            .arg(TEXT_ARG, STRING_TYPE)
    }

    fn output_spec(&self) -> ArgSpec {
        ArgSpec::new().arg(FILENAME_ARG, FILENAME_TYPE)
    }

    fn execute<'a>(
        &'a self,
        ctx: StepContext,
        inputs: &'a ArgList,
        outputs: &'a mut ArgList,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let path = required_path(self.name(), inputs)?;
            let text = inputs
                .value(TEXT_ARG)
                .map(Value::describe)
                .unwrap_or_default();

            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, text.as_bytes()).await.map_err(|e| {
                WizardError::step_failed(self.name(), format!("{}: {}", path.display(), e))
            })?;
            debug!(path = %path.display(), bytes = text.len(), "Wrote text file");

            progress_of(inputs, &ctx).update_progress(
                &format!("Wrote {}", path.display()),
                100,
                ProgressLevel::Normal,
            );
            outputs.set(FILENAME_ARG, Value::Path(path));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wizrun_core::model::ModelRegistry;
    use wizrun_core::progress::TracingProgress;
    use wizrun_core::types::ExecutionMode;

    fn ctx() -> StepContext {
        StepContext {
            mode: ExecutionMode::Batch,
            progress: Arc::new(TracingProgress::new()),
            model: Arc::new(ModelRegistry::new()),
        }
    }

    #[tokio::test]
    async fn write_then_read_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.txt");

        let write = WriteTextFileStep;
        let mut inputs = ArgList::from_spec(&write.input_spec());
        inputs.set(FILENAME_ARG, Value::path(&path));
        inputs.set(TEXT_ARG, Value::literal("hello wizard"));
        let mut outputs = ArgList::from_spec(&write.output_spec());
        write.execute(ctx(), &inputs, &mut outputs).await.unwrap();
        assert_eq!(outputs.actual(FILENAME_ARG), Some(&Value::path(&path)));

        let read = ReadTextFileStep;
        let mut inputs = ArgList::from_spec(&read.input_spec());
        inputs.set(FILENAME_ARG, Value::path(&path));
        let mut outputs = ArgList::from_spec(&read.output_spec());
        read.execute(ctx(), &inputs, &mut outputs).await.unwrap();
        assert_eq!(outputs.actual(TEXT_ARG), Some(&Value::literal("hello wizard")));
    }

    #[tokio::test]
    async fn read_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let read = ReadTextFileStep;
        let mut inputs = ArgList::from_spec(&read.input_spec());
        inputs.set(FILENAME_ARG, Value::path(dir.path().join("absent.txt")));
        let mut outputs = ArgList::from_spec(&read.output_spec());

        let err = read.execute(ctx(), &inputs, &mut outputs).await.unwrap_err();
        assert!(matches!(err, WizardError::StepFailed { .. }));
        assert!(outputs.actual(TEXT_ARG).is_none());
    }

    #[tokio::test]
    async fn read_without_filename_fails() {
        let read = ReadTextFileStep;
        let inputs = ArgList::from_spec(&read.input_spec());
        let mut outputs = ArgList::from_spec(&read.output_spec());
        let err = read.execute(ctx(), &inputs, &mut outputs).await.unwrap_err();
        assert!(err.to_string().contains("no file name"));
    }
}
