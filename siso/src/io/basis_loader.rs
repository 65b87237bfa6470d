//! Basis set loading utilities

use basis::cgto::ElementBasis;
use color_eyre::eyre::{Result, WrapErr};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Where a basis set was found
#[derive(Debug, Clone, PartialEq)]
pub enum BasisSource {
    LocalFile(PathBuf),
    Cache(PathBuf),
    Exchange,
}

/// Normalise a basis name so that spellings like `ccpvtz-dk`, `cc-pVTZ-DK`
/// and `ccpvtzdk` map onto the Basis Set Exchange name `cc-pvtz-dk`.
pub fn canonical_basis_name(name: &str) -> String {
    let lower = name.trim().to_lowercase().replace('_', "-");
    let compact: String = lower.chars().filter(|&c| c != '-').collect();

    let mut out = String::new();
    let mut rest = compact.as_str();
    if let Some(r) = rest.strip_prefix("aug") {
        if r.starts_with("cc") {
            out.push_str("aug-");
            rest = r;
        }
    }
    if let Some(r) = rest.strip_prefix("cc") {
        out.push_str("cc-");
        match r.strip_suffix("dk") {
            Some(core) => {
                out.push_str(core);
                out.push_str("-dk");
            }
            None => out.push_str(r),
        }
        return out;
    }
    if let Some(r) = compact.strip_prefix("sto") {
        return format!("sto-{}", r);
    }
    if compact.starts_with('6') && compact.len() > 1 {
        return format!("6-{}", &compact[1..]);
    }
    lower
}

fn local_path(basis_dir: &Path, name: &str, symbol: &str) -> PathBuf {
    basis_dir.join(format!("{}.{}.nwchem", name, symbol.to_lowercase()))
}

fn cache_path(cache_dir: &Path, name: &str, symbol: &str) -> PathBuf {
    cache_dir.join(format!("{}.{}.pkl", name, symbol.to_lowercase()))
}

/// Fetch basis set from a local file, the pickle cache, or the Basis Set Exchange
pub fn fetch_basis(
    symbol: &str,
    name: &str,
    basis_dir: &Path,
    cache_dir: &Path,
) -> Result<(ElementBasis, BasisSource)> {
    let name = canonical_basis_name(name);

    let local = local_path(basis_dir, &name, symbol);
    if local.exists() {
        debug!("Loading {} for {} from {}", name, symbol, local.display());
        let text = fs::read_to_string(&local)
            .wrap_err_with(|| format!("Failed to read local basis set file: {}", local.display()))?;
        let parsed = ElementBasis::parse_nwchem(&name, &text)
            .wrap_err_with(|| format!("Failed to parse {}", local.display()))?;
        return Ok((parsed, BasisSource::LocalFile(local)));
    }

    let cached = cache_path(cache_dir, &name, symbol);
    if cached.exists() {
        match ElementBasis::load_from_file(&cached.to_string_lossy()) {
            Ok(parsed) => {
                debug!("Loaded {} for {} from cache {}", name, symbol, cached.display());
                return Ok((parsed, BasisSource::Cache(cached)));
            }
            Err(e) => warn!("Ignoring unreadable basis cache {}: {}", cached.display(), e),
        }
    }

    let url = format!(
        "https://www.basissetexchange.org/api/basis/{}/format/nwchem?elements={}",
        name, symbol
    );
    info!("Fetching {} for {} from {}", name, symbol, url);
    let response = reqwest::blocking::get(&url)
        .and_then(|r| r.error_for_status())
        .wrap_err_with(|| format!("Failed to fetch basis set {} for {}", name, symbol))?;
    let text = response
        .text()
        .wrap_err("Failed to get response text from basis set API")?;
    let parsed = ElementBasis::parse_nwchem(&name, &text)
        .wrap_err_with(|| format!("Failed to parse basis set {} for {}", name, symbol))?;

    if let Err(e) = fs::create_dir_all(cache_dir)
        .map_err(basis::BasisError::from)
        .and_then(|_| parsed.save_to_file(&cached.to_string_lossy()))
    {
        warn!("Could not cache basis set at {}: {}", cached.display(), e);
    }
    Ok((parsed, BasisSource::Exchange))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_basis_names() {
        assert_eq!(canonical_basis_name("ccpvtz-dk"), "cc-pvtz-dk");
        assert_eq!(canonical_basis_name("cc-pVTZ-DK"), "cc-pvtz-dk");
        assert_eq!(canonical_basis_name("ccpvtzdk"), "cc-pvtz-dk");
        assert_eq!(canonical_basis_name("augccpvdz"), "aug-cc-pvdz");
        assert_eq!(canonical_basis_name("STO-3G"), "sto-3g");
        assert_eq!(canonical_basis_name("sto3g"), "sto-3g");
        assert_eq!(canonical_basis_name("631g"), "6-31g");
        assert_eq!(canonical_basis_name("def2-svp"), "def2-svp");
    }

    #[test]
    fn test_local_file_takes_precedence() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/basis_sets");
        let cache = std::env::temp_dir().join("siso_basis_loader_unused_cache");
        let (parsed, source) = fetch_basis("C", "STO3G", &dir, &cache).unwrap();
        assert_eq!(source, BasisSource::LocalFile(dir.join("sto-3g.c.nwchem")));
        assert_eq!(parsed.symbol, "C");
        assert_eq!(parsed.nao(), 5);
    }

    #[test]
    fn test_cache_is_used_when_no_local_file() {
        let src = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/basis_sets");
        let (parsed, _) = fetch_basis("He", "sto-3g", &src, Path::new("unused")).unwrap();

        let cache = std::env::temp_dir().join("siso_basis_loader_cache_test");
        fs::create_dir_all(&cache).unwrap();
        let pkl = cache.join("sto-3g.he.pkl");
        parsed.save_to_file(&pkl.to_string_lossy()).unwrap();

        let empty = cache.join("no_local_files");
        let (loaded, source) = fetch_basis("He", "sto-3g", &empty, &cache).unwrap();
        assert_eq!(source, BasisSource::Cache(pkl));
        assert_eq!(loaded, parsed);
    }
}
