use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde_json::json;
use shelf_query::{Filter, SortSpec};
use shelf_sched::Scheduler;
use shelf_source::{BookmarkSource, BrowseParams, BrowseResult, Source, SourceConfig};
use shelf_store::FileObjectStore;
use shelf_types::{keys, KeySelection, Metadata, MetadataValue};
use tracing::debug;

use crate::cli::*;
use crate::seed::load_seed;

type Slot<T> = Rc<RefCell<Option<T>>>;

/// A source over the configured file store, driven to completion per command.
struct Session {
    source: BookmarkSource,
    scheduler: Rc<Scheduler>,
}

impl Session {
    fn open(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => SourceConfig::from_file(path)
                .with_context(|| format!("loading configuration {}", path.display()))?,
            None => SourceConfig::default(),
        };
        if let Some(store) = &cli.store {
            config.data_path = store.clone();
        }
        Self::with_config(config)
    }

    fn with_config(config: SourceConfig) -> anyhow::Result<Self> {
        let store = FileObjectStore::open(config.data_path.clone())
            .with_context(|| format!("opening store {}", config.data_path.display()))?;
        let scheduler = Rc::new(Scheduler::new());
        let source = BookmarkSource::new(config, Arc::new(store), Rc::clone(&scheduler))?;
        Ok(Self { source, scheduler })
    }

    fn root(&self) -> String {
        self.source.root_id().to_string()
    }

    /// Run queued work until `slot` holds the callback's answer.
    fn wait<T>(&self, slot: &Slot<T>) -> anyhow::Result<T> {
        let ticks = self.scheduler.run_until_idle();
        debug!(ticks, "scheduler idle");
        slot.borrow_mut()
            .take()
            .ok_or_else(|| anyhow!("operation finished without a result"))
    }

    fn create(&self, attributes: Metadata) -> anyhow::Result<String> {
        let slot: Slot<_> = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&slot);
        self.source.create_object(
            &self.root(),
            attributes,
            Box::new(move |id, err| *sink.borrow_mut() = Some((id, err))),
        );
        match self.wait(&slot)? {
            (_, Some(err)) => Err(err.into()),
            (Some(id), None) => Ok(id.to_string()),
            (None, None) => bail!("no object id returned"),
        }
    }

    fn destroy(&self, id: &str) -> anyhow::Result<()> {
        let slot: Slot<_> = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&slot);
        self.source
            .destroy_object(id, Box::new(move |_, err| *sink.borrow_mut() = Some(err)));
        match self.wait(&slot)? {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    fn get(&self, id: &str, selection: &KeySelection) -> anyhow::Result<Option<Metadata>> {
        let slot: Slot<_> = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&slot);
        self.source.get_metadata(
            id,
            selection,
            Box::new(move |_, metadata, err| *sink.borrow_mut() = Some((metadata, err))),
        );
        match self.wait(&slot)? {
            (_, Some(err)) => Err(err.into()),
            (metadata, None) => Ok(metadata),
        }
    }

    fn set(&self, id: &str, attributes: Metadata) -> anyhow::Result<()> {
        let slot: Slot<_> = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&slot);
        self.source.set_metadata(
            id,
            attributes,
            Box::new(move |_, failed, err| *sink.borrow_mut() = Some((failed, err))),
        );
        match self.wait(&slot)? {
            (failed, Some(err)) => {
                Err(anyhow::Error::new(err).context(format!("not written: {}", failed.join(", "))))
            }
            (_, None) => Ok(()),
        }
    }

    fn browse(&self, params: BrowseParams) -> anyhow::Result<Vec<BrowseResult>> {
        let results = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&results);
        self.source
            .browse(params, Box::new(move |r| sink.borrow_mut().push(r)))?;
        self.scheduler.run_until_idle();
        let results = results.take();
        Ok(results)
    }
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let session = Session::open(&cli)?;
    let json = matches!(cli.format, OutputFormat::Json);
    match cli.command {
        Command::Add(args) => cmd_add(&session, args, json),
        Command::Rm(args) => cmd_rm(&session, args, json),
        Command::Get(args) => cmd_get(&session, args, json),
        Command::Set(args) => cmd_set(&session, args, json),
        Command::Ls(args) => cmd_ls(&session, args, json),
        Command::Seed(args) => cmd_seed(&session, args, json),
        Command::Info => cmd_info(&session, json),
    }
}

fn cmd_add(session: &Session, args: AddArgs, json: bool) -> anyhow::Result<()> {
    let mut attributes = parse_attrs(&args.attrs)?;
    attributes.insert(keys::URI.into(), MetadataValue::Str(args.uri));
    if let Some(title) = args.title {
        attributes.insert(keys::TITLE.into(), MetadataValue::Str(title));
    }
    attributes
        .entry(keys::ADDED.into())
        .or_insert(MetadataValue::Long(Utc::now().timestamp()));

    let id = session.create(attributes)?;
    if json {
        println!("{}", json!({ "id": id }));
    } else {
        println!("{} Added {}", "✓".green().bold(), id.yellow());
    }
    Ok(())
}

fn cmd_rm(session: &Session, args: RmArgs, json: bool) -> anyhow::Result<()> {
    session.destroy(&args.id)?;
    if json {
        println!("{}", json!({ "removed": args.id }));
    } else {
        println!("{} Removed {}", "✓".green().bold(), args.id.yellow());
    }
    Ok(())
}

fn cmd_get(session: &Session, args: GetArgs, json: bool) -> anyhow::Result<()> {
    let metadata = session.get(&args.id, &parse_keys(&args.keys))?;
    if json {
        let attributes = metadata.as_ref().map(metadata_json);
        println!("{}", json!({ "id": args.id, "attributes": attributes }));
        return Ok(());
    }
    println!("{}", args.id.yellow().bold());
    match metadata {
        Some(metadata) => print_metadata(&metadata),
        None => println!("  {}", "(no attributes)".dimmed()),
    }
    Ok(())
}

fn cmd_set(session: &Session, args: SetArgs, json: bool) -> anyhow::Result<()> {
    let attributes = parse_attrs(&args.attrs)?;
    let count = attributes.len();
    session.set(&args.id, attributes)?;
    if json {
        println!("{}", json!({ "id": args.id, "updated": count }));
    } else {
        println!("{} Updated {} attribute(s) of {}", "✓".green().bold(), count, args.id.yellow());
    }
    Ok(())
}

fn cmd_ls(session: &Session, args: LsArgs, json: bool) -> anyhow::Result<()> {
    let mut params = BrowseParams::new(session.root())
        .keys(parse_keys(&args.keys))
        .skip(args.skip)
        .limit(args.limit);
    if let Some(filter) = &args.filter {
        let filter: Filter = filter.parse().context("invalid filter")?;
        params = params.filter(filter);
    }
    if let Some(sort) = &args.sort {
        params = params.sort(SortSpec::parse(sort).context("invalid sort order")?);
    }

    let results = session.browse(params)?;
    if let Some(err) = results.iter().find_map(|r| r.error.clone()) {
        return Err(err.into());
    }
    let items: Vec<_> = results
        .iter()
        .filter_map(|r| r.object_id.as_ref().map(|id| (id, r.metadata.as_ref())))
        .collect();

    if json {
        let listed: Vec<_> = items
            .iter()
            .map(|(id, metadata)| {
                json!({ "id": id.to_string(), "attributes": metadata.map(metadata_json) })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listed)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No bookmarks.");
    }
    for (id, metadata) in items {
        println!("{}", id.to_string().yellow().bold());
        if let Some(metadata) = metadata {
            print_metadata(metadata);
        }
    }
    Ok(())
}

fn cmd_seed(session: &Session, args: SeedArgs, json: bool) -> anyhow::Result<()> {
    let seed = load_seed(&args.file)?;
    let report = session.source.bootstrap(&seed)?;
    match (report, json) {
        (None, true) => println!("{}", json!({ "seeded": false })),
        (None, false) => println!("Store was already seeded; nothing imported."),
        (Some(report), true) => println!(
            "{}",
            json!({
                "seeded": true,
                "imported": report.imported.len(),
                "duplicates": report.duplicates,
                "rejected": report.rejected,
            })
        ),
        (Some(report), false) => {
            println!(
                "{} Imported {} bookmark(s)",
                "✓".green().bold(),
                report.imported.len()
            );
            if report.duplicates > 0 {
                println!("  Duplicates skipped: {}", report.duplicates.to_string().yellow());
            }
            if report.rejected > 0 {
                println!("  Without uri: {}", report.rejected.to_string().red());
            }
        }
    }
    Ok(())
}

fn cmd_info(session: &Session, json: bool) -> anyhow::Result<()> {
    let root = session.root();
    let count = session
        .get(&root, &KeySelection::from_keys([keys::CHILDCOUNT]))?
        .and_then(|m| m.get(keys::CHILDCOUNT).and_then(MetadataValue::as_i64))
        .unwrap_or(0);
    let config = session.source.config();

    if json {
        println!(
            "{}",
            json!({
                "uuid": config.uuid,
                "root": root,
                "store": config.data_path.display().to_string(),
                "items": count,
                "check_duplicates": config.check_duplicates,
            })
        );
        return Ok(());
    }
    println!("Source: {}", config.uuid.bold());
    println!("Root: {}", root.cyan());
    println!("Store: {}", config.data_path.display());
    println!("Bookmarks: {}", count.to_string().bold());
    Ok(())
}

/// Parse `key=value`, `key:int=N` or `key:long=N`.
fn parse_attr(raw: &str) -> anyhow::Result<(String, MetadataValue)> {
    let (lhs, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected key=value, got {raw:?}"))?;
    let (key, kind) = lhs.split_once(':').unwrap_or((lhs, "str"));
    if key.is_empty() {
        bail!("empty attribute key in {raw:?}");
    }
    let value = match kind {
        "str" => MetadataValue::from(value),
        "int" => MetadataValue::Int(
            value
                .parse()
                .with_context(|| format!("{value:?} is not a 32-bit integer"))?,
        ),
        "long" => MetadataValue::Long(
            value
                .parse()
                .with_context(|| format!("{value:?} is not a 64-bit integer"))?,
        ),
        other => bail!("unknown attribute type {other:?} (expected str, int or long)"),
    };
    Ok((key.to_string(), value))
}

fn parse_attrs(raw: &[String]) -> anyhow::Result<Metadata> {
    raw.iter().map(|a| parse_attr(a)).collect()
}

fn parse_keys(raw: &str) -> KeySelection {
    KeySelection::from_keys(raw.split(',').map(str::trim).filter(|k| !k.is_empty()))
}

fn display_value(key: &str, value: &MetadataValue) -> String {
    match (key, value) {
        (keys::ADDED, MetadataValue::Long(secs)) => DateTime::<Utc>::from_timestamp(*secs, 0)
            .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| value.to_string()),
        _ => value.to_string(),
    }
}

fn print_metadata(metadata: &Metadata) {
    for (key, value) in metadata {
        println!("  {}: {}", key.bold(), display_value(key, value));
    }
}

fn metadata_json(metadata: &Metadata) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = metadata
        .iter()
        .map(|(key, value)| {
            let value = match value {
                MetadataValue::Str(s) => json!(s),
                MetadataValue::Int(n) => json!(n),
                MetadataValue::Long(n) => json!(n),
                MetadataValue::Blob(bytes) => json!(bytes),
            };
            (key.clone(), value)
        })
        .collect();
    serde_json::Value::Object(map)
}
