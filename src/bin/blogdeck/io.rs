#![deny(clippy::all, clippy::pedantic)]

use std::fs;
use std::path::PathBuf;

use blogdeck::application::error::AppError;
use blogdeck::config::BodyArgs;

/// Post content from `--body-file` when given, else `--body`.
pub fn read_body(args: BodyArgs) -> Result<String, AppError> {
    if args.body.is_none() && args.body_file.is_none() {
        return Err(AppError::invalid_input(
            "either --body or --body-file is required",
        ));
    }
    read_value(args.body, args.body_file)
}

pub fn read_value(val: Option<String>, file: Option<PathBuf>) -> Result<String, AppError> {
    if let Some(path) = file {
        let data = fs::read_to_string(&path).map_err(|source| AppError::InputFile {
            path: path.display().to_string(),
            source,
        })?;
        Ok(data)
    } else if let Some(v) = val {
        Ok(v)
    } else {
        Err(AppError::invalid_input("value required"))
    }
}
