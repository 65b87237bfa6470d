use crate::io::{canonical_basis_name, fetch_basis, BasisSource};
use ::basis::cgto::ElementBasis;
use color_eyre::eyre::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

pub type BasisMap = HashMap<String, ElementBasis>;

/// Loader trait that can be implemented for any source of element basis sets.
pub trait BasisLoader {
    fn load(&self, symbol: &str, name: &str) -> Result<ElementBasis>;
}

/// Local NWChem files first, then the pickle cache, then the Basis Set Exchange.
pub struct FileBasisLoader {
    basis_dir: PathBuf,
    cache_dir: PathBuf,
}

impl FileBasisLoader {
    pub fn new(basis_dir: impl AsRef<Path>, cache_dir: impl AsRef<Path>) -> Self {
        Self {
            basis_dir: basis_dir.as_ref().to_path_buf(),
            cache_dir: cache_dir.as_ref().to_path_buf(),
        }
    }
}

impl BasisLoader for FileBasisLoader {
    fn load(&self, symbol: &str, name: &str) -> Result<ElementBasis> {
        let (basis, source) = fetch_basis(symbol, name, &self.basis_dir, &self.cache_dir)?;
        match source {
            BasisSource::LocalFile(path) => info!("{} {}: local file {}", symbol, name, path.display()),
            BasisSource::Cache(path) => info!("{} {}: cached {}", symbol, name, path.display()),
            BasisSource::Exchange => info!("{} {}: Basis Set Exchange", symbol, name),
        }
        Ok(basis)
    }
}

/// Registry that caches loaded basis sets per (element, basis name).
pub struct BasisRegistry<L: BasisLoader> {
    loader: L,
    cache: HashMap<(String, String), ElementBasis>,
}

impl<L: BasisLoader> BasisRegistry<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            cache: HashMap::new(),
        }
    }

    pub fn load_for_elements(&mut self, name: &str, symbols: &[&str]) -> Result<BasisMap> {
        let name = canonical_basis_name(name);
        let mut map = BasisMap::new();
        for &symbol in symbols {
            let key = (symbol.to_string(), name.clone());
            if !self.cache.contains_key(&key) {
                info!("Loading {} basis for {}", name, symbol);
                let basis = self.loader.load(symbol, &name)?;
                self.cache.insert(key.clone(), basis);
            }
            if let Some(basis) = self.cache.get(&key) {
                map.insert(symbol.to_string(), basis.clone());
            }
        }
        Ok(map)
    }
}
