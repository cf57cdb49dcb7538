use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::dispatch::PropertyMap;

/// Newline-delimited `Key=Value` text.
pub fn render_property_file(properties: &PropertyMap) -> String {
    let mut out = String::new();
    for (key, value) in properties {
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }
    out
}

/// File-system safe version of a job name.
pub fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "job".to_string()
    } else {
        stem
    }
}

/// Job and plugin property files for one submission. Temporary files are
/// removed when this value drops.
#[derive(Debug)]
pub struct PropertyFiles {
    job_file: PathBuf,
    plugin_file: PathBuf,
    _temporary: Vec<NamedTempFile>,
}

impl PropertyFiles {
    /// Writes `<stem>.job` and `<stem>.plugin` into `directory`, or into
    /// temporary files when no directory is given.
    pub fn write(
        directory: Option<&Path>,
        stem: &str,
        job_properties: &PropertyMap,
        plugin_properties: &PropertyMap,
    ) -> io::Result<Self> {
        let job_text = render_property_file(job_properties);
        let plugin_text = render_property_file(plugin_properties);

        match directory {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                let job_file = dir.join(format!("{stem}.job"));
                let plugin_file = dir.join(format!("{stem}.plugin"));
                fs::write(&job_file, job_text)?;
                fs::write(&plugin_file, plugin_text)?;
                Ok(Self {
                    job_file,
                    plugin_file,
                    _temporary: Vec::new(),
                })
            }
            None => {
                let job = temporary(stem, ".job", &job_text)?;
                let plugin = temporary(stem, ".plugin", &plugin_text)?;
                Ok(Self {
                    job_file: job.path().to_path_buf(),
                    plugin_file: plugin.path().to_path_buf(),
                    _temporary: vec![job, plugin],
                })
            }
        }
    }

    pub fn job_file(&self) -> &Path {
        &self.job_file
    }

    pub fn plugin_file(&self) -> &Path {
        &self.plugin_file
    }
}

fn temporary(stem: &str, suffix: &str, text: &str) -> io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix(&format!("{stem}."))
        .suffix(suffix)
        .tempfile()?;
    file.write_all(text.as_bytes())?;
    file.flush()?;
    Ok(file)
}
