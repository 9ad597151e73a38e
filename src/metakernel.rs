//! # Metakernels
//!
//! A metakernel is a text kernel listing the kernels to load as a set:
//!
//! ```text
//! \begindata
//!    PATH_SYMBOLS    = ( 'ROOT' )
//!    PATH_VALUES     = ( '/data/dart/kernels' )
//!    KERNELS_TO_LOAD = ( '$ROOT/fk/dart.tf',
//!                        '$ROOT/ik/draco.ti' )
//! \begintext
//! ```
//!
//! [`read_metakernel`] expands every `$SYMBOL` in `KERNELS_TO_LOAD` with the paired
//! entry of `PATH_VALUES`. Paths that are still relative after substitution are taken
//! relative to the directory holding the metakernel.
//!
//! [`write_metakernel`] produces the same layout with a single `ROOT` symbol set to
//! the deepest directory shared by every kernel.
use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use tracing::debug;

use crate::{kernel_pool::KernelPool, pointing_errors::PointingError};

pub const PATH_SYMBOLS: &str = "PATH_SYMBOLS";
pub const PATH_VALUES: &str = "PATH_VALUES";
pub const KERNELS_TO_LOAD: &str = "KERNELS_TO_LOAD";

/// Expand the kernel list of a metakernel already parsed into `pool`.
///
/// Arguments
/// -----------------
/// * `pool`: kernel pool holding the metakernel assignments.
/// * `path`: location of the metakernel, used for error messages and relative paths.
///
/// Return
/// ----------
/// * The kernels in load order, or [`PointingError::MetaKernelPathMismatch`] when the
///   symbol and value arrays differ in length.
pub fn expand_kernels(pool: &KernelPool, path: &Utf8Path) -> Result<Vec<Utf8PathBuf>, PointingError> {
    let symbols = pool.strings(PATH_SYMBOLS).unwrap_or_default();
    let values = pool.strings(PATH_VALUES).unwrap_or_default();
    if symbols.len() != values.len() {
        return Err(PointingError::MetaKernelPathMismatch {
            path: path.to_string(),
            symbols: symbols.len(),
            values: values.len(),
        });
    }

    // longest symbols first so that $ROOT2 is not rewritten by $ROOT
    let substitutions = symbols
        .iter()
        .zip(values)
        .sorted_by_key(|(symbol, _)| std::cmp::Reverse(symbol.len()))
        .collect_vec();

    let base = path.parent().unwrap_or(Utf8Path::new(""));
    let kernels = pool
        .strings(KERNELS_TO_LOAD)
        .unwrap_or_default()
        .iter()
        .map(|entry| {
            let expanded = substitutions
                .iter()
                .fold(entry.clone(), |acc, (symbol, value)| {
                    acc.replace(&format!("${symbol}"), value)
                });
            let kernel = Utf8PathBuf::from(expanded);
            if kernel.is_relative() {
                base.join(kernel)
            } else {
                kernel
            }
        })
        .collect_vec();

    Ok(kernels)
}

/// Read a metakernel from disk and return the kernels it lists, in load order.
///
/// A metakernel without `KERNELS_TO_LOAD` lists no kernels.
pub fn read_metakernel(path: &Utf8Path) -> Result<Vec<Utf8PathBuf>, PointingError> {
    let mut pool = KernelPool::new();
    pool.load_text_kernel(path)?;
    let kernels = expand_kernels(&pool, path)?;
    debug!(metakernel = %path, kernels = kernels.len(), "read metakernel");
    Ok(kernels)
}

/// Deepest directory that is an ancestor of every kernel.
fn common_root(kernels: &[Utf8PathBuf]) -> Utf8PathBuf {
    let Some(first) = kernels.first() else {
        return Utf8PathBuf::from(".");
    };
    first
        .ancestors()
        .skip(1)
        .find(|prefix| kernels.iter().all(|k| k.starts_with(prefix)))
        .filter(|prefix| !prefix.as_str().is_empty())
        .map_or_else(|| Utf8PathBuf::from("."), Utf8Path::to_path_buf)
}

/// Render the text of a metakernel listing `kernels` below a single `ROOT` symbol.
pub fn metakernel_text(kernels: &[Utf8PathBuf]) -> String {
    let root = common_root(kernels);
    let entries = kernels
        .iter()
        .map(|kernel| {
            let relative = kernel.strip_prefix(&root).unwrap_or(kernel);
            format!(
                "                  '$ROOT/{}'",
                relative.as_str().replace('\'', "''")
            )
        })
        .join(",\n");
    let entries = if entries.is_empty() { entries } else { entries + "\n" };

    format!(
        "\\begindata\n\n   PATH_SYMBOLS = ( 'ROOT' )\n   PATH_VALUES  = ( '{root}' )\n\n\\begintext\n\
         \\begindata\n\n   KERNELS_TO_LOAD = (\n{entries}   )\n\n\\begintext\n",
        root = root.as_str().replace('\'', "''"),
    )
}

/// Write a metakernel listing `kernels` to `path`.
pub fn write_metakernel(path: &Utf8Path, kernels: &[Utf8PathBuf]) -> Result<(), PointingError> {
    std::fs::write(path, metakernel_text(kernels))?;
    debug!(metakernel = %path, kernels = kernels.len(), "wrote metakernel");
    Ok(())
}
