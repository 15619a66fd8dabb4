use crate::config::{ServeArgs, ServerConfig};
use crate::error::ServerError;
use viewer_engine::load_dataset;

/// Validate the config and every dataset it names. Prints one line per
/// dataset: path, id (or `<generated>`), title, rows, columns.
pub fn run(args: &ServeArgs) -> Result<(), ServerError> {
    let config = ServerConfig::load(&args.config)?;
    if config.datasets.is_empty() {
        return Err(ServerError::NoComponents("[[datasets]]"));
    }

    for source in &config.datasets {
        let dataset = load_dataset(source)?;
        let id = if dataset.id.is_empty() { "<generated>" } else { dataset.id.as_str() };
        println!(
            "{}\t{}\t{}\t{} rows\t{} columns",
            source.path.display(),
            id,
            dataset.title,
            dataset.row_count,
            dataset.columns.len(),
        );
    }
    tracing::info!(datasets = config.datasets.len(), config = %args.config, "config ok");
    Ok(())
}
