//! Batch loading of models with per item error aggregation.
use log::error;
use souls_binder::resolve::ResourceResolver;

use crate::ModelRoot;

/// Success and failure counts for one batch operation.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct BatchReport {
    pub loaded: usize,
    pub failed: usize,
}

/// Resolve and decode each requested model, continuing past failures.
///
/// Failed requests are logged and counted instead of aborting the
/// remaining batch. `decode` supplies the binary model codec.
#[tracing::instrument(skip_all)]
pub fn resolve_models<F, E>(
    resolver: &mut ResourceResolver,
    requests: &[String],
    mut decode: F,
) -> (Vec<(String, ModelRoot)>, BatchReport)
where
    F: FnMut(&str, &[u8]) -> Result<ModelRoot, E>,
    E: std::fmt::Display,
{
    let mut models = Vec::new();
    let mut report = BatchReport::default();

    for name in requests {
        match resolver.resolve(name) {
            Ok(data) => match decode(name, data) {
                Ok(root) => {
                    models.push((name.clone(), root));
                    report.loaded += 1;
                }
                Err(e) => {
                    error!("Error decoding model {name:?}: {e}");
                    report.failed += 1;
                }
            },
            Err(e) => {
                error!("Error resolving model {name:?}: {e}");
                report.failed += 1;
            }
        }
    }

    (models, report)
}
