use super::{json_pretty, spin_fail, spin_ok, spinner, summarize, EXIT_FAILURE, EXIT_SUCCESS};
use instancectl_core::{ComposeSettings, InstanceSettings, Operations, Orchestrator};
use instancectl_runtime::{check_manager_prereqs, format_missing, ArchiveReader, SystemRunner};
use std::path::Path;

pub fn load_compose_settings(config: Option<&Path>) -> Result<ComposeSettings, String> {
    match config {
        Some(path) => ComposeSettings::load(path).map_err(|e| e.to_string()),
        None => Ok(ComposeSettings::default()),
    }
}

fn describe(ops: &Operations) -> String {
    let mut parts = Vec::new();
    if ops.update {
        parts.push("update".to_owned());
    }
    for archive in &ops.restore {
        parts.push(format!("restore {}", archive.display()));
    }
    if ops.rebuild {
        parts.push("rebuild".to_owned());
    }
    parts.join(", ")
}

pub fn run(settings: &InstanceSettings, ops: &Operations, json: bool) -> Result<u8, String> {
    if std::env::var("INSTANCECTL_SKIP_PREREQS").as_deref() != Ok("1") {
        let compose = settings
            .compose
            .compose_tokens()
            .first()
            .copied()
            .unwrap_or_default();
        let formats: Vec<ArchiveReader> = ops
            .restore
            .iter()
            .filter_map(|a| ArchiveReader::detect(a).ok())
            .collect();
        let missing = check_manager_prereqs(compose, &formats);
        if !missing.is_empty() {
            eprintln!("error: {}", format_missing(&missing));
            return Ok(EXIT_FAILURE);
        }
    }

    let runner = SystemRunner::captured();
    let orchestrator = Orchestrator::new(settings, &runner);

    let pb = if json {
        None
    } else {
        Some(spinner(&format!("{}...", describe(ops))))
    };
    let reports = match orchestrator.run_operations(ops) {
        Ok(r) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "instance operations finished");
            }
            r
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "instance operation failed");
            }
            return Err(e.to_string());
        }
    };

    if json {
        let payload = serde_json::json!({
            "worker_dir": settings.worker_dir,
            "compose_file": settings.compose_file,
            "workflows": reports,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        for report in &reports {
            println!("{}", summarize(report));
        }
    }
    Ok(EXIT_SUCCESS)
}
