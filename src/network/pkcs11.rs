//! PKCS#11 drivers
//!
//! Drivers used to access smart cards and HSMs, persisted under `pkcs11.drivers`.

use crate::config::{shared, ConfigTree, SharedConfig};

const ALL_DRIVERS_KEY: &str = "pkcs11.drivers.driver";
const DRIVER_NAME: &str = "name";
const DRIVER_LIBRARY: &str = "library";
const DRIVER_SLOT: &str = "slot";
const DRIVER_SLOT_LIST_INDEX: &str = "slotListIndex";

/// A PKCS#11 driver library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pkcs11Driver {
    pub name: String,
    pub library: String,
    pub slot: i32,
    pub slot_list_index: i32,
}

impl Pkcs11Driver {
    pub fn new(name: impl Into<String>, library: impl Into<String>, slot: i32, slot_list_index: i32) -> Self {
        Self {
            name: name.into(),
            library: library.into(),
            slot: slot.max(0),
            slot_list_index: slot_list_index.max(0),
        }
    }
}

/// The configured PKCS#11 drivers
pub struct Pkcs11Drivers {
    config: SharedConfig,
    drivers: Vec<Pkcs11Driver>,
}

impl Default for Pkcs11Drivers {
    fn default() -> Self {
        Self {
            config: shared(ConfigTree::new()),
            drivers: Vec::new(),
        }
    }
}

impl Pkcs11Drivers {
    /// Read the drivers from `config`, skipping incomplete ones
    pub fn load(config: SharedConfig) -> Self {
        let drivers = config
            .read()
            .configurations_at(ALL_DRIVERS_KEY)
            .iter()
            .filter_map(|sub| {
                let name = sub.get_string_or(DRIVER_NAME, "");
                let library = sub.get_string_or(DRIVER_LIBRARY, "");
                if name.is_empty() || library.is_empty() {
                    tracing::warn!(name = %name, library = %library, "Ignoring incomplete PKCS#11 driver");
                    return None;
                }
                Some(Pkcs11Driver::new(
                    name,
                    library,
                    sub.get_int_or(DRIVER_SLOT, 0),
                    sub.get_int_or(DRIVER_SLOT_LIST_INDEX, 0),
                ))
            })
            .collect();
        Self { config, drivers }
    }

    fn persist(&self) {
        let mut tree = self.config.write();
        tree.clear_tree(ALL_DRIVERS_KEY);
        for (i, driver) in self.drivers.iter().enumerate() {
            let base = format!("{}({})", ALL_DRIVERS_KEY, i);
            tree.set_property(&format!("{}.{}", base, DRIVER_NAME), &driver.name);
            tree.set_property(&format!("{}.{}", base, DRIVER_LIBRARY), &driver.library);
            tree.set_property(&format!("{}.{}", base, DRIVER_SLOT), driver.slot);
            tree.set_property(&format!("{}.{}", base, DRIVER_SLOT_LIST_INDEX), driver.slot_list_index);
        }
    }

    pub fn drivers(&self) -> &[Pkcs11Driver] {
        &self.drivers
    }

    pub fn add_driver(&mut self, driver: Pkcs11Driver) {
        self.drivers.push(driver);
        self.persist();
    }

    /// Remove the driver at `index`, returning it if present
    pub fn remove_driver(&mut self, index: usize) -> Option<Pkcs11Driver> {
        if index >= self.drivers.len() {
            return None;
        }
        let driver = self.drivers.remove(index);
        self.persist();
        Some(driver)
    }

    pub fn set_drivers(&mut self, drivers: Vec<Pkcs11Driver>) {
        self.drivers = drivers;
        self.persist();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_skips_incomplete() {
        let mut tree = ConfigTree::new();
        tree.set_property("pkcs11.drivers.driver(0).name", "OpenSC");
        tree.set_property("pkcs11.drivers.driver(0).library", "/usr/lib/opensc-pkcs11.so");
        tree.set_property("pkcs11.drivers.driver(0).slot", -3);
        tree.set_property("pkcs11.drivers.driver(1).name", "NoLibrary");
        tree.set_property("pkcs11.drivers.driver(2).name", "Other");
        tree.set_property("pkcs11.drivers.driver(2).library", "other.so");
        tree.set_property("pkcs11.drivers.driver(2).slotListIndex", "x");

        let drivers = Pkcs11Drivers::load(shared(tree));
        assert_eq!(
            drivers.drivers(),
            &[
                Pkcs11Driver::new("OpenSC", "/usr/lib/opensc-pkcs11.so", 0, 0),
                Pkcs11Driver::new("Other", "other.so", 0, 0),
            ]
        );
    }

    #[test]
    fn test_add_and_remove() {
        let config = shared(ConfigTree::new());
        let mut drivers = Pkcs11Drivers::load(config.clone());
        drivers.add_driver(Pkcs11Driver::new("A", "a.so", 1, 2));
        drivers.add_driver(Pkcs11Driver::new("B", "b.so", 0, 0));
        assert_eq!(drivers.remove_driver(0).map(|d| d.name), Some("A".to_string()));
        assert!(drivers.remove_driver(5).is_none());

        let reloaded = Pkcs11Drivers::load(config);
        assert_eq!(reloaded.drivers(), &[Pkcs11Driver::new("B", "b.so", 0, 0)]);
    }
}
