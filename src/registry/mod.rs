//! Active symbol list, normalized to OKX perpetual swap instrument ids

use crate::error::SignalError;
use std::sync::{Arc, RwLock};

const QUOTE: &str = "USDT";
const SWAP_SUFFIX: &str = "SWAP";

/// Normalize exchange-specific formatting to `BASE-USDT-SWAP`
///
/// Accepts `btc`, `BTCUSDT`, `BTC-USDT`, `BTC/USDT`, `btc_usdt`, `BTC-USDT-SWAP`.
pub fn normalize_symbol(raw: &str) -> Result<String, SignalError> {
    let upper = raw.trim().to_uppercase().replace(['/', '_', ' '], "-");
    let mut parts: Vec<&str> = upper.split('-').filter(|p| !p.is_empty()).collect();

    if parts.last() == Some(&SWAP_SUFFIX) {
        parts.pop();
    }

    let base: &str = match parts.as_slice() {
        [single] => single
            .strip_suffix(QUOTE)
            .filter(|b| !b.is_empty())
            .unwrap_or(*single),
        [base, quote] if *quote == QUOTE => *base,
        _ => return Err(SignalError::InvalidSymbol(raw.to_string())),
    };

    if base.is_empty() || !base.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(SignalError::InvalidSymbol(raw.to_string()));
    }

    Ok(format!("{}-{}-{}", base, QUOTE, SWAP_SUFFIX))
}

/// Shared, ordered list of symbols
///
/// Cloning shares the underlying list. Readers get copies from `snapshot()`.
#[derive(Debug, Clone, Default)]
pub struct SymbolRegistry {
    symbols: Arc<RwLock<Vec<String>>>,
}

impl SymbolRegistry {
    pub fn new<I, S>(symbols: I) -> Result<Self, SignalError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let registry = Self::default();
        registry.replace_all(symbols)?;
        Ok(registry)
    }

    /// Copy of the current list
    pub fn snapshot(&self) -> Vec<String> {
        match self.symbols.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add one symbol; returns false if it was already present
    pub fn add(&self, raw: &str) -> Result<bool, SignalError> {
        let symbol = normalize_symbol(raw)?;
        let mut guard = self
            .symbols
            .write()
            .map_err(|_| SignalError::LockPoisoned("symbol registry"))?;
        if guard.contains(&symbol) {
            return Ok(false);
        }
        guard.push(symbol);
        Ok(true)
    }

    /// Remove one symbol; returns false if it was not present
    pub fn remove(&self, raw: &str) -> Result<bool, SignalError> {
        let symbol = normalize_symbol(raw)?;
        let mut guard = self
            .symbols
            .write()
            .map_err(|_| SignalError::LockPoisoned("symbol registry"))?;
        let before = guard.len();
        guard.retain(|s| s != &symbol);
        Ok(guard.len() != before)
    }

    /// Swap the whole list; nothing changes if any entry fails to normalize
    pub fn replace_all<I, S>(&self, symbols: I) -> Result<(), SignalError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut next: Vec<String> = Vec::new();
        for raw in symbols {
            let symbol = normalize_symbol(raw.as_ref())?;
            if !next.contains(&symbol) {
                next.push(symbol);
            }
        }

        let mut guard = self
            .symbols
            .write()
            .map_err(|_| SignalError::LockPoisoned("symbol registry"))?;
        *guard = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_variants() {
        for raw in ["btc", "BTCUSDT", "BTC-USDT", "BTC/USDT", "btc_usdt", "btc-usdt-swap", " BTC-USDT-SWAP "] {
            assert_eq!(normalize_symbol(raw).unwrap(), "BTC-USDT-SWAP", "input {:?}", raw);
        }
        assert_eq!(normalize_symbol("1000pepe").unwrap(), "1000PEPE-USDT-SWAP");
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize_symbol("").is_err());
        assert!(normalize_symbol("BTC-USD-SWAP").is_err());
        assert!(normalize_symbol("BTC-ETH-USDT").is_err());
        assert!(normalize_symbol("B$C").is_err());
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let registry = SymbolRegistry::new(["btc", "eth"]).unwrap();
        let mut snap = registry.snapshot();
        snap.push("SOL-USDT-SWAP".to_string());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_add_remove_dedupe() {
        let registry = SymbolRegistry::new(["BTCUSDT", "btc-usdt", "ETH"]).unwrap();
        assert_eq!(registry.snapshot(), vec!["BTC-USDT-SWAP", "ETH-USDT-SWAP"]);

        assert!(registry.add("sol").unwrap());
        assert!(!registry.add("SOL-USDT-SWAP").unwrap());
        assert!(registry.remove("eth").unwrap());
        assert!(!registry.remove("eth").unwrap());
        assert_eq!(registry.snapshot(), vec!["BTC-USDT-SWAP", "SOL-USDT-SWAP"]);
    }

    #[test]
    fn test_replace_all_is_atomic() {
        let registry = SymbolRegistry::new(["btc"]).unwrap();
        assert!(registry.replace_all(["eth", "not/a/pair"]).is_err());
        assert_eq!(registry.snapshot(), vec!["BTC-USDT-SWAP"]);
    }

    #[test]
    fn test_concurrent_readers() {
        let registry = SymbolRegistry::new(["btc", "eth", "sol"]).unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let r = registry.clone();
                std::thread::spawn(move || r.snapshot().len())
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 3);
        }
    }
}
