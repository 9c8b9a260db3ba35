//! Preset bookmark files.
//!
//! ```toml
//! [[bookmark]]
//! uri = "http://radio.example/jazz"
//! title = "Jazz"
//! bitrate = 128
//! ```

use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;
use shelf_source::StaticBootstrap;
use shelf_types::{Metadata, MetadataValue};

#[derive(Deserialize)]
struct SeedFile {
    #[serde(default)]
    bookmark: Vec<toml::Table>,
}

pub fn load_seed(path: &Path) -> anyhow::Result<StaticBootstrap> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading seed file {}", path.display()))?;
    parse_seed(&text).with_context(|| format!("parsing seed file {}", path.display()))
}

pub fn parse_seed(text: &str) -> anyhow::Result<StaticBootstrap> {
    let file: SeedFile = toml::from_str(text)?;
    let entries = file
        .bookmark
        .into_iter()
        .map(convert)
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(StaticBootstrap::new(entries))
}

fn convert(table: toml::Table) -> anyhow::Result<Metadata> {
    table
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                toml::Value::String(s) => MetadataValue::Str(s),
                toml::Value::Integer(n) => match i32::try_from(n) {
                    Ok(small) => MetadataValue::Int(small),
                    Err(_) => MetadataValue::Long(n),
                },
                other => bail!("attribute {key:?} has unsupported type {}", other.type_str()),
            };
            Ok((key, value))
        })
        .collect()
}
