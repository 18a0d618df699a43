//! Hint context: caller-supplied sharding values for the current thread.
//!
//! A [`HintManager`] attaches a [`HintState`] to the calling thread for the
//! duration of one unit of work. While attached, the routing engine takes
//! database and table sharding values from the hint instead of from the
//! statement. Dropping the manager detaches the state, so every exit path of
//! the unit of work releases it, including `?` returns and panics.
//!
//! ```rust,ignore
//! let mut hint = HintManager::acquire()?;
//! hint.add_database_sharding_value("t_order", 1);
//! hint.add_table_sharding_value("t_order", 2);
//! let result = engine.route(&statement)?;
//! // hint released here
//! ```
//!
//! Only one context may be attached to a thread at a time; a second
//! [`HintManager::acquire`] fails with `HintAlreadyActive` until the first is
//! released.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::marker::PhantomData;

use tracing::debug;

use crate::core::ShardingValue;
use crate::error::{Result, ShardingError};

thread_local! {
    static HINT_STATE: RefCell<Option<HintState>> = const { RefCell::new(None) };
}

/// Key under which database-only values are stored.
const UNKEYED: &str = "";

/// Sharding overrides for one unit of work.
///
/// Usually reached through [`HintManager`]; it can also be built directly and
/// passed to [`RouteEngine::route_with`](crate::route::RouteEngine::route_with)
/// when routing on behalf of another execution context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HintState {
    database_values: BTreeMap<String, Vec<ShardingValue>>,
    table_values: BTreeMap<String, Vec<ShardingValue>>,
    database_sharding_only: bool,
    write_route_only: bool,
    data_source_name: Option<String>,
}

impl HintState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route every table's database dimension by `value` alone.
    ///
    /// Clears all database and table values first.
    pub fn set_database_sharding_value(&mut self, value: impl Into<ShardingValue>) {
        self.database_values.clear();
        self.table_values.clear();
        self.database_values
            .insert(UNKEYED.to_string(), vec![value.into()]);
        self.database_sharding_only = true;
    }

    /// Add a database sharding value for one logic table.
    ///
    /// Leaves database-sharding-only mode, dropping its unkeyed value.
    pub fn add_database_sharding_value(&mut self, logic_table: &str, value: impl Into<ShardingValue>) {
        self.leave_database_only();
        self.database_values
            .entry(logic_table.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// Add a table sharding value for one logic table.
    ///
    /// Leaves database-sharding-only mode, dropping its unkeyed value.
    pub fn add_table_sharding_value(&mut self, logic_table: &str, value: impl Into<ShardingValue>) {
        self.leave_database_only();
        self.table_values
            .entry(logic_table.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    fn leave_database_only(&mut self) {
        if self.database_sharding_only {
            self.database_values.remove(UNKEYED);
        }
        self.database_sharding_only = false;
    }

    pub fn set_write_route_only(&mut self) {
        self.write_route_only = true;
    }

    pub fn set_readwrite_splitting_auto(&mut self) {
        self.write_route_only = false;
    }

    /// Send every table of the statement to one data source, unsharded.
    pub fn set_data_source_name(&mut self, name: impl Into<String>) {
        self.data_source_name = Some(name.into());
    }

    /// Wipe all values and flags.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Database sharding values for a logic table (empty if none).
    pub fn database_sharding_values(&self, logic_table: &str) -> &[ShardingValue] {
        self.database_values
            .get(&logic_table.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The database-only values set by [`set_database_sharding_value`](Self::set_database_sharding_value).
    pub fn unkeyed_database_values(&self) -> &[ShardingValue] {
        self.database_values
            .get(UNKEYED)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Table sharding values for a logic table (empty if none).
    pub fn table_sharding_values(&self, logic_table: &str) -> &[ShardingValue] {
        self.table_values
            .get(&logic_table.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_database_sharding_only(&self) -> bool {
        self.database_sharding_only
    }

    pub fn is_write_route_only(&self) -> bool {
        self.write_route_only
    }

    pub fn data_source_name(&self) -> Option<&str> {
        self.data_source_name.as_deref()
    }
}

/// Scoped handle to the hint context of the current thread.
///
/// The handle is not `Send`: the context belongs to the thread that acquired
/// it and is released there when the handle drops.
#[derive(Debug)]
pub struct HintManager {
    _thread_bound: PhantomData<*const ()>,
}

impl HintManager {
    /// Attach an empty hint context to the current thread.
    ///
    /// # Errors
    ///
    /// `HintAlreadyActive` if a context is already attached.
    pub fn acquire() -> Result<Self> {
        HINT_STATE.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.is_some() {
                return Err(ShardingError::HintAlreadyActive);
            }
            *slot = Some(HintState::default());
            Ok(())
        })?;
        debug!("Hint context acquired");
        Ok(Self {
            _thread_bound: PhantomData,
        })
    }

    fn update(&self, f: impl FnOnce(&mut HintState)) {
        HINT_STATE.with(|slot| {
            if let Some(state) = slot.borrow_mut().as_mut() {
                f(state);
            }
        });
    }

    pub fn set_database_sharding_value(&mut self, value: impl Into<ShardingValue>) {
        let value = value.into();
        self.update(|s| s.set_database_sharding_value(value));
    }

    pub fn add_database_sharding_value(&mut self, logic_table: &str, value: impl Into<ShardingValue>) {
        let value = value.into();
        self.update(|s| s.add_database_sharding_value(logic_table, value));
    }

    pub fn add_table_sharding_value(&mut self, logic_table: &str, value: impl Into<ShardingValue>) {
        let value = value.into();
        self.update(|s| s.add_table_sharding_value(logic_table, value));
    }

    pub fn set_write_route_only(&mut self) {
        self.update(HintState::set_write_route_only);
    }

    pub fn set_readwrite_splitting_auto(&mut self) {
        self.update(HintState::set_readwrite_splitting_auto);
    }

    pub fn set_data_source_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.update(|s| s.set_data_source_name(name));
    }

    /// Wipe all values and flags, keeping the context attached.
    pub fn clear(&mut self) {
        self.update(HintState::clear);
    }

    /// Detach the context. Equivalent to dropping the handle.
    pub fn release(self) {}

    /// True if a context is attached to the current thread.
    pub fn is_instantiated() -> bool {
        HINT_STATE.with(|slot| slot.borrow().is_some())
    }

    /// Copy of the current thread's context, if one is attached.
    pub fn snapshot() -> Option<HintState> {
        HINT_STATE.with(|slot| slot.borrow().clone())
    }

    pub fn database_sharding_values(logic_table: &str) -> Vec<ShardingValue> {
        Self::read(|s| s.database_sharding_values(logic_table).to_vec()).unwrap_or_default()
    }

    pub fn table_sharding_values(logic_table: &str) -> Vec<ShardingValue> {
        Self::read(|s| s.table_sharding_values(logic_table).to_vec()).unwrap_or_default()
    }

    pub fn is_database_sharding_only() -> bool {
        Self::read(HintState::is_database_sharding_only).unwrap_or(false)
    }

    pub fn is_write_route_only() -> bool {
        Self::read(HintState::is_write_route_only).unwrap_or(false)
    }

    pub fn data_source_name() -> Option<String> {
        Self::read(|s| s.data_source_name().map(str::to_string)).flatten()
    }

    fn read<T>(f: impl FnOnce(&HintState) -> T) -> Option<T> {
        HINT_STATE.with(|slot| slot.borrow().as_ref().map(f))
    }
}

impl Drop for HintManager {
    fn drop(&mut self) {
        HINT_STATE.with(|slot| slot.borrow_mut().take());
        debug!("Hint context released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let hint = HintManager::acquire().unwrap();
        assert!(HintManager::is_instantiated());
        assert!(matches!(
            HintManager::acquire(),
            Err(ShardingError::HintAlreadyActive)
        ));
        hint.release();
        assert!(!HintManager::is_instantiated());
        let again = HintManager::acquire().unwrap();
        drop(again);
    }

    #[test]
    fn test_database_only_mode_transitions() {
        let mut hint = HintManager::acquire().unwrap();
        hint.add_table_sharding_value("t_order", 9);
        hint.set_database_sharding_value(3);
        assert!(HintManager::is_database_sharding_only());
        assert!(HintManager::table_sharding_values("t_order").is_empty());

        hint.add_table_sharding_value("T_ORDER", 4);
        assert!(!HintManager::is_database_sharding_only());
        let state = HintManager::snapshot().unwrap();
        assert!(state.unkeyed_database_values().is_empty());
        assert_eq!(state.table_sharding_values("t_order"), &[ShardingValue::Int(4)]);
    }

    #[test]
    fn test_add_database_value_leaves_database_only_mode() {
        let mut state = HintState::new();
        state.set_database_sharding_value(1);
        state.add_database_sharding_value("t_order", 2);
        state.add_database_sharding_value("t_order", 3);
        assert!(!state.is_database_sharding_only());
        assert!(state.unkeyed_database_values().is_empty());
        assert_eq!(
            state.database_sharding_values("t_order"),
            &[ShardingValue::Int(2), ShardingValue::Int(3)]
        );
    }

    #[test]
    fn test_flags_and_clear() {
        let mut hint = HintManager::acquire().unwrap();
        hint.set_write_route_only();
        hint.set_data_source_name("ds_1");
        hint.add_database_sharding_value("t_order", 1);
        assert!(HintManager::is_write_route_only());
        assert_eq!(HintManager::data_source_name().as_deref(), Some("ds_1"));

        hint.set_readwrite_splitting_auto();
        assert!(!HintManager::is_write_route_only());

        hint.set_write_route_only();
        hint.clear();
        assert!(HintManager::is_instantiated());
        assert_eq!(HintManager::snapshot(), Some(HintState::default()));
    }

    #[test]
    fn test_reads_without_context_are_empty() {
        assert!(!HintManager::is_instantiated());
        assert!(HintManager::database_sharding_values("t_order").is_empty());
        assert!(!HintManager::is_database_sharding_only());
        assert!(HintManager::data_source_name().is_none());
    }

    #[test]
    fn test_released_on_error_path() {
        fn failing() -> Result<()> {
            let mut hint = HintManager::acquire()?;
            hint.add_table_sharding_value("t_order", 1);
            Err(ShardingError::NoRouteTarget("t_order".into()))
        }
        assert!(failing().is_err());
        assert!(!HintManager::is_instantiated());
    }

    #[test]
    fn test_contexts_are_per_thread() {
        let _hint = HintManager::acquire().unwrap();
        let other = std::thread::spawn(|| {
            let hint = HintManager::acquire();
            (hint.is_ok(), HintManager::is_instantiated())
        })
        .join()
        .unwrap();
        assert_eq!(other, (true, true));
    }
}
