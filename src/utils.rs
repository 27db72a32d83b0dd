use crate::errors::Result;
use log::info;

/// Sanitizes a filename by removing invalid characters.
/// `$` becomes `S` so shells and ffmpeg argument strings stay inert.
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            '$' => 'S',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Creates a directory if it doesn't exist
pub async fn ensure_dir_exists(path: &std::path::Path) -> Result<()> {
    if !path.exists() {
        tokio::fs::create_dir_all(path).await?;
        info!("Created directory: {:?}", path);
    }
    Ok(())
}

/// Generates a unique ID for conversion jobs
pub fn generate_job_id() -> uuid::Uuid {
    uuid::Uuid::new_v4()
}
