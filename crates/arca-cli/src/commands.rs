use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde_json::json;
use tracing::debug;

use arca_registry::InMemoryRegistry;
use arca_sdk::{Arca, ArcaConfig, BackupPreview, RestoreReport, VerifyReport, WriteOutcome};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => ArcaConfig::load(path)?,
        None => ArcaConfig::default(),
    };
    let format = cli.format;
    match cli.command {
        Command::Backup(args) => cmd_backup(args, config, &format),
        Command::Incremental(args) => cmd_incremental(args, config, &format),
        Command::Preview(args) => cmd_preview(args, config, &format),
        Command::Verify(args) => cmd_verify(args, config, &format),
        Command::Restore(args) => cmd_restore(args, config, &format),
        Command::Select(args) => cmd_select(args, config, &format),
    }
}

/// A fixture store: an in-memory registry persisted as a JSON snapshot.
struct Store {
    path: PathBuf,
    registry: Arc<InMemoryRegistry>,
}

impl Store {
    fn open(args: &StoreArgs) -> anyhow::Result<Self> {
        let text = fs::read_to_string(&args.store)
            .with_context(|| format!("cannot read store {}", args.store.display()))?;
        let registry = InMemoryRegistry::from_json(&text)
            .with_context(|| format!("invalid store {}", args.store.display()))?;
        debug!(store = %args.store.display(), rows = registry.total_rows(), "store loaded");
        Ok(Self {
            path: args.store.clone(),
            registry: Arc::new(registry),
        })
    }

    fn arca(&self, config: ArcaConfig) -> Arca {
        Arca::new(self.registry.clone(), config)
    }

    fn save(&self) -> anyhow::Result<()> {
        fs::write(&self.path, self.registry.to_json()?)
            .with_context(|| format!("cannot write store {}", self.path.display()))?;
        Ok(())
    }
}

fn read_archive(path: &Path) -> anyhow::Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("cannot read archive {}", path.display()))
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}

fn cmd_backup(args: BackupArgs, config: ArcaConfig, format: &OutputFormat) -> anyhow::Result<()> {
    let store = Store::open(&args.store)?;
    let include_attachments = config.backup.include_attachments && !args.no_attachments;
    let outcome = store
        .arca(config)
        .create_backup(non_empty(args.models), include_attachments)?;
    fs::write(&args.out, &outcome.bytes)
        .with_context(|| format!("cannot write archive {}", args.out.display()))?;
    print_backup(&outcome, &args.out, format)
}

fn cmd_incremental(
    args: IncrementalArgs,
    config: ArcaConfig,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let store = Store::open(&args.store)?;
    let outcome = store
        .arca(config)
        .create_incremental_backup(args.since, non_empty(args.models))?;
    fs::write(&args.out, &outcome.bytes)
        .with_context(|| format!("cannot write archive {}", args.out.display()))?;
    print_backup(&outcome, &args.out, format)
}

fn cmd_preview(args: PreviewArgs, config: ArcaConfig, format: &OutputFormat) -> anyhow::Result<()> {
    let bytes = read_archive(&args.archive)?;
    let preview = Arca::new(Arc::new(InMemoryRegistry::new()), config).preview_backup(&bytes)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&preview)?),
        OutputFormat::Text => print_preview(&preview),
    }
    Ok(())
}

fn cmd_verify(args: VerifyArgs, config: ArcaConfig, format: &OutputFormat) -> anyhow::Result<()> {
    let bytes = read_archive(&args.archive)?;
    let store = Store::open(&args.store)?;
    let report = store.arca(config).verify_backup(&bytes)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_verify(&report),
    }
    Ok(())
}

fn cmd_restore(args: RestoreArgs, config: ArcaConfig, format: &OutputFormat) -> anyhow::Result<()> {
    let bytes = read_archive(&args.archive)?;
    let store = Store::open(&args.store)?;
    let preserve_ids = args.preserve_ids || config.restore.preserve_ids;
    let skip_existing = args.skip_existing || config.restore.skip_existing;
    let report = store
        .arca(config)
        .restore_backup(&bytes, preserve_ids, skip_existing)?;
    store.save()?;
    print_restore(&report, format)
}

fn cmd_select(
    args: SelectArgs,
    mut config: ArcaConfig,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let bytes = read_archive(&args.archive)?;
    let store = Store::open(&args.store)?;
    config.restore.preserve_ids |= args.preserve_ids;
    config.restore.skip_existing |= args.skip_existing;
    let report = store.arca(config).selective_restore(
        &bytes,
        non_empty(args.models),
        non_empty(args.pks),
    )?;
    store.save()?;
    print_restore(&report, format)
}

// ---- Output ----

fn print_backup(outcome: &WriteOutcome, out: &Path, format: &OutputFormat) -> anyhow::Result<()> {
    if let OutputFormat::Json = format {
        let doc = json!({
            "archive": out.display().to_string(),
            "manifest": outcome.manifest,
            "warnings": outcome.warnings,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }
    let manifest = &outcome.manifest;
    let kind = if manifest.is_incremental() { "Incremental backup" } else { "Backup" };
    println!(
        "{} {} written to {}",
        "✓".green().bold(),
        kind,
        out.display().to_string().bold()
    );
    println!("  Objects: {}", manifest.object_count.to_string().bold());
    for (model, count) in &manifest.per_model_counts {
        println!("    {}: {}", model.as_str().cyan(), count);
    }
    println!("  Attachments: {}", manifest.attachment_count);
    if let Some(since) = manifest.since {
        println!("  Since: {}", since.to_rfc3339().yellow());
    }
    for warning in &outcome.warnings {
        println!("  {} {}", "skipped:".yellow(), warning);
    }
    Ok(())
}

fn print_preview(preview: &BackupPreview) {
    println!(
        "Archive format {}, created {}",
        preview.format_version.bold(),
        preview.created_at.to_rfc3339()
    );
    if let Some(tenant) = &preview.origin_tenant_id {
        println!("  Origin tenant: {}", tenant.cyan());
    }
    if let Some(since) = preview.since {
        println!("  Incremental since {}", since.to_rfc3339().yellow());
    }
    println!("  Objects: {}", preview.object_count.to_string().bold());
    for (model, count) in &preview.by_model {
        println!("    {}: {}", model.as_str().cyan(), count);
    }
    println!("  Attachments: {}", preview.attachment_count);
}

fn print_verify(report: &VerifyReport) {
    println!("{} Archive can be restored", "✓".green().bold());
    println!("  Objects: {}", report.preview.object_count);
    println!(
        "  Checksum: {}",
        match &report.data_checksum {
            Some(_) => "valid".green(),
            None => "absent".yellow(),
        }
    );
    println!("  Dependencies: {} edges, depth {}", report.edges, report.depth());
    for (i, size) in report.level_sizes.iter().enumerate() {
        println!("    level {}: {} records", i, size);
    }
}

fn print_restore(report: &RestoreReport, format: &OutputFormat) -> anyhow::Result<()> {
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    let mark = if report.errors.is_empty() {
        "✓".green().bold()
    } else {
        "!".yellow().bold()
    };
    println!(
        "{} Restored {} records ({} skipped), {} attachments",
        mark,
        report.total_created().to_string().bold(),
        report.total_skipped(),
        report.attachments_restored
    );
    if report.remapped {
        println!("  Primary keys: {}", "regenerated".cyan());
    }
    if let Some(since) = report.incremental_since {
        println!("  Incremental layer since {}", since.to_rfc3339().yellow());
    }
    for (model, count) in &report.created_per_model {
        println!("    {}: {} created", model.as_str().cyan(), count);
    }
    for (model, count) in &report.skipped_per_model {
        println!("    {}: {} skipped", model.as_str().cyan(), count);
    }
    for warning in &report.warnings {
        println!("  {} {}", "warning:".yellow(), warning);
    }
    for error in &report.errors {
        println!("  {} {}", "error:".red(), error);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arca_registry::{Attachment, Instance, ModelRegistry};
    use arca_types::{FieldDescriptor, ModelId, PrimaryKey, ValueKind};
    use clap::Parser;

    fn model(name: &str) -> ModelId {
        ModelId::new(name).unwrap()
    }

    fn schema() -> InMemoryRegistry {
        let registry = InMemoryRegistry::new();
        registry.register_model(
            model("core.framework"),
            vec![FieldDescriptor::scalar("name", ValueKind::Text)],
        );
        registry.register_model(
            model("core.control"),
            vec![
                FieldDescriptor::scalar("ref_id", ValueKind::Text),
                FieldDescriptor::single_ref("framework", model("core.framework")).nullable(),
                FieldDescriptor::attachment("guide"),
            ],
        );
        registry
    }

    /// Write a populated source store and an empty target store.
    fn stores(dir: &Path) -> (PathBuf, PathBuf, PrimaryKey) {
        let source = schema();
        let fw = PrimaryKey::generate();
        source
            .insert(&model("core.framework"), Instance::new(fw).with_scalar("name", "SOC 2"))
            .unwrap();
        source
            .insert(
                &model("core.control"),
                Instance::new(PrimaryKey::generate())
                    .with_scalar("ref_id", "CC6.1")
                    .with_ref("framework", Some(fw))
                    .with_attachment("guide", Attachment::new("cc61.md", b"# CC6.1".to_vec())),
            )
            .unwrap();
        let source_path = dir.join("source.json");
        fs::write(&source_path, source.to_json().unwrap()).unwrap();
        let target_path = dir.join("target.json");
        fs::write(&target_path, schema().to_json().unwrap()).unwrap();
        (source_path, target_path, fw)
    }

    fn run(args: &[&str]) -> anyhow::Result<()> {
        run_command(Cli::try_parse_from(args).unwrap())
    }

    fn load(path: &Path) -> InMemoryRegistry {
        InMemoryRegistry::from_json(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn backup_then_restore_rewrites_target_store() {
        let dir = tempfile::tempdir().unwrap();
        let (source, target, _) = stores(dir.path());
        let archive = dir.path().join("backup.zip");
        let (source, target, archive) = (
            source.to_str().unwrap(),
            target.to_str().unwrap(),
            archive.to_str().unwrap(),
        );

        run(&["arca", "backup", "--store", source, "--out", archive]).unwrap();
        run(&["arca", "preview", archive]).unwrap();
        run(&["arca", "verify", archive, "--store", target]).unwrap();
        run(&["arca", "--format", "json", "restore", archive, "--store", target]).unwrap();

        let restored = load(Path::new(target));
        assert_eq!(restored.total_rows(), 2);
        let controls = restored.iterate(&model("core.control"), None).unwrap();
        assert_eq!(controls[0].attachments["guide"].bytes, b"# CC6.1");
        let frameworks = restored.iterate(&model("core.framework"), None).unwrap();
        assert_eq!(controls[0].single_refs["framework"], Some(frameworks[0].pk));
    }

    #[test]
    fn preserving_restore_is_repeatable_with_skip() {
        let dir = tempfile::tempdir().unwrap();
        let (source, target, fw) = stores(dir.path());
        let archive = dir.path().join("backup.zip");
        let (source, target, archive) = (
            source.to_str().unwrap(),
            target.to_str().unwrap(),
            archive.to_str().unwrap(),
        );

        run(&["arca", "backup", "--store", source, "--out", archive, "--no-attachments"]).unwrap();
        for _ in 0..2 {
            run(&[
                "arca", "restore", archive, "--store", target, "--preserve-ids", "--skip-existing",
            ])
            .unwrap();
        }
        let restored = load(Path::new(target));
        assert_eq!(restored.total_rows(), 2);
        assert!(restored.exists(&model("core.framework"), &fw).unwrap());

        // Without skip, every record collides and the store is left alone.
        let err = run(&["arca", "restore", archive, "--store", target, "--preserve-ids"]);
        assert!(err.is_err());
        assert_eq!(load(Path::new(target)).total_rows(), 2);
    }

    #[test]
    fn select_restores_only_the_chosen_model() {
        let dir = tempfile::tempdir().unwrap();
        let (source, target, _) = stores(dir.path());
        let archive = dir.path().join("backup.zip");
        let (source, target, archive) = (
            source.to_str().unwrap(),
            target.to_str().unwrap(),
            archive.to_str().unwrap(),
        );

        run(&["arca", "backup", "--store", source, "--out", archive]).unwrap();
        run(&["arca", "select", archive, "--store", target, "-m", "core.control"]).unwrap();

        let restored = load(Path::new(target));
        assert_eq!(restored.count(&model("core.framework")).unwrap(), 0);
        let controls = restored.iterate(&model("core.control"), None).unwrap();
        assert_eq!(controls.len(), 1);
        assert_eq!(controls[0].single_refs["framework"], None);

        assert!(run(&["arca", "select", archive, "--store", target]).is_err());
    }

    #[test]
    fn incremental_and_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let (source, _, _) = stores(dir.path());
        let config = dir.path().join("arca.toml");
        fs::write(&config, "[backup]\nmodels = [\"core.framework\"]\ninclude_attachments = false\n")
            .unwrap();
        let archive = dir.path().join("inc.zip");
        let (source, config, archive_str) = (
            source.to_str().unwrap(),
            config.to_str().unwrap(),
            archive.to_str().unwrap(),
        );

        run(&[
            "arca",
            "--config",
            config,
            "incremental",
            "--store",
            source,
            "--out",
            archive_str,
            "--since",
            "2000-01-01T00:00:00Z",
        ])
        .unwrap();

        let arca = Arca::new(Arc::new(InMemoryRegistry::new()), ArcaConfig::default());
        let preview = arca.preview_backup(&fs::read(&archive).unwrap()).unwrap();
        assert!(preview.is_incremental());
        assert_eq!(preview.object_count, 1);
        assert_eq!(preview.attachment_count, 0);
    }

    #[test]
    fn missing_store_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        let out = dir.path().join("out.zip");
        let err = run(&[
            "arca",
            "backup",
            "--store",
            missing.to_str().unwrap(),
            "--out",
            out.to_str().unwrap(),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("cannot read store"));
        assert!(!out.exists());
    }
}
