//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `geomodel_core` linkage.
//! - Walk one identifier through register, resolve and eviction.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `geomodel_cli [absolute-log-dir]`. Without a directory nothing is
//! logged to disk.

use geomodel_core::{
    default_log_level, init_logging, FeatureReference, Model, ModelPools, ModelResult, PlateId,
    TopLevelProperty,
};
use log::info;
use std::process::ExitCode;
use std::rc::Rc;

fn main() -> ExitCode {
    if let Some(log_dir) = std::env::args().nth(1) {
        if let Err(err) = init_logging(default_log_level(), &log_dir) {
            eprintln!("geomodel_cli logging error: {err}");
            return ExitCode::FAILURE;
        }
    }

    println!("geomodel_core version={}", geomodel_core::core_version());
    match run_probe() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("geomodel_cli probe error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_probe() -> ModelResult<()> {
    let model = Model::new(ModelPools::new());
    let flushes = Rc::new(std::cell::Cell::new(0_u32));
    let seen = Rc::clone(&flushes);
    model.subscribe(move |_| seen.set(seen.get() + 1));

    let collection = model.create_feature_collection(Some("probe.gpml".to_string()))?;
    let plate_id = model.names().property_name("gpml:reconstructionPlateId")?;
    let reference = model.names().property_name("gpml:conjugate")?;

    let feature = {
        let _changeset = model.changeset("probe: create isochron");
        let _guard = model.notification_guard();
        let feature = model.create_feature_with_id("gpml:Isochron", "F1", &collection)?;
        feature.add_property(TopLevelProperty::single(plate_id.clone(), PlateId(801)));
        feature.add_property(TopLevelProperty::single(
            reference,
            FeatureReference::new(feature.feature_id().clone()),
        ));
        feature
    };
    println!("probe flushes={}", flushes.get());
    println!("probe resolve(F1)={}", model.resolve("F1").len());

    let removed = collection.remove_feature(&feature);
    drop(feature);
    println!("probe removed={removed} resolve(F1)={}", model.resolve("F1").len());
    println!(
        "probe identifier_loaded={}",
        model.identifiers().is_loaded("F1")
    );

    info!(
        "event=cli_probe module=cli status=ok flushes={} collections={}",
        flushes.get(),
        model.root().len()
    );
    Ok(())
}
