//! Live filtered and sorted views.
//!
//! A [`DataView`] moves through three states: Unopened, Open and Closed.
//! Opening scans the table once and registers the view on the table's
//! change feed; from then on each published row change re-evaluates only
//! that row. A reset (clear, merge, load, schema edit) or a new filter,
//! sort or row state filter rebuilds the whole index. Closing unregisters
//! the view and freezes its index.
//!
//! The feed holds views weakly, so dropping an open view is enough to stop
//! notifications.

use crate::change_set::ChangeSet;
use crate::related::{KeyBinding, RelatedViewKey};
use crate::subscription::{SubscriptionId, SubscriptionManager};
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use tabula_core::schema::Column;
use tabula_core::{Error, Result, RowId, Value};
use tabula_expr::Expression;
use tabula_index::{MultiKeyComparator, SortedIndex};
use tabula_storage::{ChangeListener, DataTable, ListenerId, RowStateFilter, SortSpec, TableChange};
use tracing::{debug, trace, warn};

/// Lifecycle of a view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViewState {
    Unopened,
    Open,
    /// Unregistered; the index is frozen at its last state.
    Closed,
}

/// Filter, sort and row states of a view.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSettings {
    /// Boolean expression rows must satisfy, e.g. `"price > 10"`.
    pub filter: Option<String>,
    /// Sort text, e.g. `"name ASC, price DESC"`. Unsorted views keep
    /// table order.
    pub sort: Option<String>,
    pub row_states: RowStateFilter,
}

pub(crate) struct ViewCore {
    settings: ViewSettings,
    pub(crate) binding: Option<KeyBinding>,
    filter: Option<Expression>,
    sort: SortSpec,
    index: SortedIndex,
    subscriptions: SubscriptionManager,
    state: ViewState,
}

fn unsorted(case_sensitive: bool) -> SortSpec {
    SortSpec {
        columns: Vec::new(),
        comparator: MultiKeyComparator::new(Vec::new(), case_sensitive),
    }
}

fn non_empty(text: &Option<String>) -> Option<&str> {
    text.as_deref().map(str::trim).filter(|t| !t.is_empty())
}

impl ViewCore {
    fn new(settings: ViewSettings, binding: Option<KeyBinding>) -> Self {
        let sort = unsorted(false);
        Self {
            settings,
            binding,
            filter: None,
            index: SortedIndex::new(sort.comparator.clone()),
            sort,
            subscriptions: SubscriptionManager::new(),
            state: ViewState::Unopened,
        }
    }

    /// Binds filter and sort to the table's columns.
    fn compile(&mut self, table: &DataTable) -> Result<()> {
        let filter = match non_empty(&self.settings.filter) {
            Some(text) => Some(Expression::compile(text, table)?),
            None => None,
        };
        let sort = match non_empty(&self.settings.sort) {
            Some(text) => table.resolve_sort(text)?,
            None => unsorted(table.is_case_sensitive()),
        };
        if let Some(binding) = &self.binding {
            binding.check(table)?;
        }
        self.filter = filter;
        self.sort = sort;
        Ok(())
    }

    /// Sort key of `row` if the view shows it.
    fn evaluate(&self, table: &DataTable, row: RowId) -> Option<Vec<Value>> {
        let values = table.visible_values(row, self.settings.row_states)?;
        if let Some(binding) = &self.binding {
            if !binding.matches(values, table.is_case_sensitive()) {
                return None;
            }
        }
        if let Some(filter) = &self.filter {
            match filter.matches(values) {
                Ok(true) => {}
                Ok(false) => return None,
                Err(e) => {
                    trace!(row, error = %e, "filter failed; row hidden");
                    return None;
                }
            }
        }
        Some(self.sort.key(values))
    }

    fn rebuild(&mut self, table: &DataTable) -> ChangeSet {
        let old: Vec<RowId> = self.index.row_ids().collect();
        let entries = table
            .rows()
            .filter_map(|(id, _)| self.evaluate(table, id).map(|key| (key, id)))
            .collect();
        self.index = SortedIndex::from_entries(self.sort.comparator.clone(), entries);
        debug!(table = %table.name(), rows = self.index.len(), "view rebuild");
        ChangeSet::diff(&old, self.index.row_ids().collect())
    }

    /// Recompiles after a reset; a view whose filter or sort no longer
    /// binds becomes empty.
    fn reset(&mut self, table: &DataTable) -> ChangeSet {
        match self.compile(table) {
            Ok(()) => self.rebuild(table),
            Err(e) => {
                warn!(table = %table.name(), error = %e, "view no longer binds to its table");
                let old: Vec<RowId> = self.index.row_ids().collect();
                self.index.clear();
                ChangeSet::diff(&old, Vec::new())
            }
        }
    }

    fn update_row(&mut self, table: &DataTable, row: RowId) -> ChangeSet {
        let old_key = self.index.key_of(row).map(<[Value]>::to_vec);
        if let Some(key) = &old_key {
            self.index.remove(key, row);
        }
        let new_key = if table.contains_row(row) {
            self.evaluate(table, row)
        } else {
            None
        };
        let mut changes = ChangeSet::new();
        match (old_key.is_some(), new_key) {
            (false, None) => return changes,
            (true, None) => changes.removed.push(row),
            (false, Some(key)) => {
                self.index.insert(key, row);
                changes.added.push(row);
            }
            (true, Some(key)) => {
                self.index.insert(key, row);
                changes.modified.push(row);
            }
        }
        trace!(row, added = changes.added.len(), removed = changes.removed.len(), "view update");
        changes.current_result = self.index.row_ids().collect();
        changes
    }
}

impl ChangeListener for ViewCore {
    fn on_change(&mut self, table: &DataTable, change: TableChange) {
        if self.state != ViewState::Open {
            return;
        }
        let changes = match change {
            TableChange::Reset => self.reset(table),
            TableChange::Row { row, .. } => self.update_row(table, row),
        };
        self.subscriptions.notify_all(&changes);
    }
}

/// A live, ordered projection of a table's rows.
///
/// ```rust
/// use tabula_core::schema::Column;
/// use tabula_core::{DataType, Value};
/// use tabula_storage::DataTable;
/// use tabula_view::DataView;
///
/// let mut table = DataTable::new("fruit");
/// table.add_column(Column::new("name", DataType::String)).unwrap();
/// table.add(vec![Value::from("pear")]).unwrap();
///
/// let mut view = DataView::new().with_sort("name");
/// view.open(&mut table).unwrap();
/// let apple = table.add(vec![Value::from("apple")]).unwrap();
/// assert_eq!(view.get(0), Some(apple));
/// ```
pub struct DataView {
    core: Rc<RefCell<ViewCore>>,
    listener: Option<ListenerId>,
}

impl Default for DataView {
    fn default() -> Self {
        Self::new()
    }
}

impl DataView {
    /// Creates an unopened view showing current rows in table order.
    pub fn new() -> Self {
        Self::with_settings(ViewSettings::default())
    }

    pub fn with_settings(settings: ViewSettings) -> Self {
        Self::build(settings, None)
    }

    pub(crate) fn build(settings: ViewSettings, binding: Option<KeyBinding>) -> Self {
        Self {
            core: Rc::new(RefCell::new(ViewCore::new(settings, binding))),
            listener: None,
        }
    }

    pub fn with_filter(self, filter: impl Into<String>) -> Self {
        self.core.borrow_mut().settings.filter = Some(filter.into());
        self
    }

    pub fn with_sort(self, sort: impl Into<String>) -> Self {
        self.core.borrow_mut().settings.sort = Some(sort.into());
        self
    }

    pub fn with_row_state_filter(self, states: RowStateFilter) -> Self {
        self.core.borrow_mut().settings.row_states = states;
        self
    }

    pub fn state(&self) -> ViewState {
        self.core.borrow().state
    }

    pub fn settings(&self) -> ViewSettings {
        self.core.borrow().settings.clone()
    }

    /// Builds the index over `table` and starts following its changes.
    ///
    /// A closed view may be opened again, on the same or another table.
    pub fn open(&mut self, table: &mut DataTable) -> Result<()> {
        let changes = {
            let mut core = self.core.borrow_mut();
            if core.state == ViewState::Open {
                return Err(Error::invalid_operation("view is already open"));
            }
            core.compile(table)?;
            let changes = core.rebuild(table);
            core.state = ViewState::Open;
            changes
        };
        let listener: Rc<RefCell<dyn ChangeListener>> = self.core.clone();
        self.listener = Some(table.subscribe(&listener));
        debug!(table = %table.name(), rows = changes.current_result.len(), "view open");
        self.core.borrow().subscriptions.notify_all(&changes);
        Ok(())
    }

    /// Stops following `table`. The index keeps its last state.
    pub fn close(&mut self, table: &mut DataTable) {
        if let Some(id) = self.listener.take() {
            table.unsubscribe(id);
        }
        let mut core = self.core.borrow_mut();
        if core.state == ViewState::Open {
            core.state = ViewState::Closed;
            debug!(table = %table.name(), "view close");
        }
    }

    /// Changes the filter. An open view rebuilds; if the new filter does not
    /// compile the old one stays.
    pub fn set_filter(&mut self, table: &DataTable, filter: Option<&str>) -> Result<()> {
        let filter = filter.map(str::to_string);
        self.reconfigure(table, |s| s.filter = filter)
    }

    pub fn set_sort(&mut self, table: &DataTable, sort: Option<&str>) -> Result<()> {
        let sort = sort.map(str::to_string);
        self.reconfigure(table, |s| s.sort = sort)
    }

    pub fn set_row_state_filter(&mut self, table: &DataTable, states: RowStateFilter) -> Result<()> {
        self.reconfigure(table, |s| s.row_states = states)
    }

    fn reconfigure(&mut self, table: &DataTable, edit: impl FnOnce(&mut ViewSettings)) -> Result<()> {
        let mut core = self.core.borrow_mut();
        let previous = core.settings.clone();
        edit(&mut core.settings);
        if core.state != ViewState::Open {
            return Ok(());
        }
        if let Err(e) = core.compile(table) {
            core.settings = previous;
            return Err(e);
        }
        let changes = core.rebuild(table);
        core.subscriptions.notify_all(&changes);
        Ok(())
    }

    // === Reads ===

    pub fn len(&self) -> usize {
        self.core.borrow().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.borrow().index.is_empty()
    }

    /// Row ids in view order.
    pub fn row_ids(&self) -> Vec<RowId> {
        self.core.borrow().index.row_ids().collect()
    }

    /// Row id at a position.
    pub fn get(&self, pos: usize) -> Option<RowId> {
        self.core.borrow().index.get(pos)
    }

    pub fn position_of(&self, row: RowId) -> Option<usize> {
        self.core.borrow().index.position_of(row)
    }

    /// Values of the row at `pos`, in the version the row state filter
    /// selects.
    pub fn values<'t>(&self, table: &'t DataTable, pos: usize) -> Result<&'t [Value]> {
        let row = self
            .get(pos)
            .ok_or_else(|| Error::invalid_operation(format!("position {} is outside the view", pos)))?;
        let states = self.core.borrow().settings.row_states;
        table.visible_values(row, states).ok_or_else(|| Error::RowNotFound {
            table: table.name().to_string(),
            row,
        })
    }

    /// Position of the first row whose sort key equals `key`.
    pub fn find(&self, key: &[Value]) -> Result<Option<usize>> {
        let range = self.key_range(key)?;
        Ok((!range.is_empty()).then_some(range.start))
    }

    /// Every row whose sort key equals `key`, in view order.
    pub fn find_rows(&self, key: &[Value]) -> Result<Vec<RowId>> {
        let range = self.key_range(key)?;
        let core = self.core.borrow();
        Ok(range.filter_map(|pos| core.index.get(pos)).collect())
    }

    fn key_range(&self, key: &[Value]) -> Result<core::ops::Range<usize>> {
        let core = self.core.borrow();
        if core.sort.is_empty() {
            return Err(Error::invalid_operation("find requires a sorted view"));
        }
        if key.len() != core.sort.columns.len() {
            return Err(Error::invalid_operation(format!(
                "expected {} key values, got {}",
                core.sort.columns.len(),
                key.len()
            )));
        }
        Ok(core.index.equal_range(key))
    }

    /// Registers a callback receiving a [`ChangeSet`] after each update.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&ChangeSet) + 'static,
    {
        self.core.borrow_mut().subscriptions.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.core.borrow_mut().subscriptions.unsubscribe(id)
    }

    /// Key identifying a view bound to a parent row, if this is one.
    pub fn related_key(&self) -> Option<RelatedViewKey> {
        let core = self.core.borrow();
        core.binding.as_ref().map(|b| RelatedViewKey {
            columns: b.columns.clone(),
            key: b.key.clone(),
            filter: non_empty(&core.settings.filter).map(str::to_string),
        })
    }

    /// Copies the visible rows, in view order, into a new table named
    /// `name`. `columns` selects and orders the columns (all when empty);
    /// with `distinct` repeated rows are dropped. Copied rows are
    /// Unchanged.
    pub fn to_table(&self, table: &DataTable, name: &str, distinct: bool, columns: &[&str]) -> Result<DataTable> {
        let ordinals = if columns.is_empty() {
            (0..table.column_count()).collect()
        } else {
            table.ordinals(columns)?
        };
        let mut out = DataTable::with_options(name, table.options().clone());
        for &o in &ordinals {
            if let Some(c) = table.column(o) {
                out.add_column(Column::new(c.name(), c.data_type()).caption(c.get_caption()))?;
            }
        }
        let states = self.core.borrow().settings.row_states;
        let mut seen: HashSet<Vec<Value>> = HashSet::new();
        for row in self.row_ids() {
            let Some(values) = table.visible_values(row, states) else {
                continue;
            };
            let projected: Vec<Value> = ordinals
                .iter()
                .map(|&o| values.get(o).cloned().unwrap_or(Value::Null))
                .collect();
            if distinct && !seen.insert(projected.clone()) {
                continue;
            }
            out.add(projected)?;
        }
        out.accept_changes()?;
        Ok(out)
    }
}

impl core::fmt::Debug for DataView {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let core = self.core.borrow();
        f.debug_struct("DataView")
            .field("state", &core.state)
            .field("settings", &core.settings)
            .field("rows", &core.index.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_core::DataType;

    fn fruit() -> DataTable {
        let mut t = DataTable::new("fruit");
        t.add_column(Column::new("name", DataType::String)).unwrap();
        t.add_column(Column::new("price", DataType::Float64)).unwrap();
        for (name, price) in [("pear", 3.0), ("apple", 1.0), ("fig", 2.0)] {
            t.add(vec![Value::from(name), Value::Float64(price)]).unwrap();
        }
        t.accept_changes().unwrap();
        t
    }

    fn names(view: &DataView, table: &DataTable) -> Vec<String> {
        (0..view.len())
            .map(|pos| view.values(table, pos).unwrap()[0].to_string())
            .collect()
    }

    #[test]
    fn test_state_machine() {
        let mut t = fruit();
        let mut view = DataView::new();
        assert_eq!(view.state(), ViewState::Unopened);
        assert!(view.is_empty());
        view.open(&mut t).unwrap();
        assert_eq!(view.state(), ViewState::Open);
        assert!(view.open(&mut t).is_err());
        view.close(&mut t);
        assert_eq!(view.state(), ViewState::Closed);
        assert!(t.feed().is_empty());
        view.open(&mut t).unwrap();
        assert_eq!(view.len(), 3);
    }

    #[test]
    fn test_open_filters_and_sorts() {
        let mut t = fruit();
        let mut view = DataView::new().with_filter("price >= 2").with_sort("name");
        view.open(&mut t).unwrap();
        assert_eq!(names(&view, &t), vec!["fig", "pear"]);
    }

    #[test]
    fn test_incremental_updates() {
        let mut t = fruit();
        let mut view = DataView::new().with_filter("price >= 2").with_sort("price DESC");
        view.open(&mut t).unwrap();

        let kiwi = t.add(vec![Value::from("kiwi"), Value::Float64(5.0)]).unwrap();
        assert_eq!(view.get(0), Some(kiwi));
        t.set_value(kiwi, 1, 0.5).unwrap();
        assert_eq!(view.position_of(kiwi), None);
        let apple = t.row_ids().nth(1).unwrap();
        t.set_value(apple, 1, 2.5).unwrap();
        assert_eq!(names(&view, &t), vec!["pear", "apple", "fig"]);
        t.delete_row(apple).unwrap();
        assert_eq!(names(&view, &t), vec!["pear", "fig"]);
    }

    #[test]
    fn test_closed_view_is_frozen() {
        let mut t = fruit();
        let mut view = DataView::new();
        view.open(&mut t).unwrap();
        view.close(&mut t);
        t.add(vec![Value::from("kiwi"), Value::Float64(5.0)]).unwrap();
        assert_eq!(view.len(), 3);
    }

    #[test]
    fn test_reset_rebuilds() {
        let mut t = fruit();
        let mut view = DataView::new().with_sort("name");
        view.open(&mut t).unwrap();
        t.clear().unwrap();
        assert!(view.is_empty());
    }

    #[test]
    fn test_schema_change_unbinds_view() {
        let mut t = fruit();
        let mut view = DataView::new().with_sort("price");
        view.open(&mut t).unwrap();
        t.remove_column("price").unwrap();
        assert!(view.is_empty());
        assert_eq!(view.state(), ViewState::Open);
    }

    #[test]
    fn test_reconfigure() {
        let mut t = fruit();
        let mut view = DataView::new();
        view.open(&mut t).unwrap();
        view.set_sort(&t, Some("price")).unwrap();
        assert_eq!(names(&view, &t), vec!["apple", "fig", "pear"]);
        assert!(view.set_filter(&t, Some("nope > 1")).is_err());
        assert_eq!(view.settings().filter, None);
        view.set_filter(&t, Some("name LIKE '%p%'")).unwrap();
        assert_eq!(names(&view, &t), vec!["apple", "pear"]);
    }

    #[test]
    fn test_row_state_filter() {
        let mut t = fruit();
        let first = t.row_ids().next().unwrap();
        t.set_value(first, 1, 9.0).unwrap();
        let mut view = DataView::new().with_row_state_filter(RowStateFilter::MODIFIED_ORIGINAL);
        view.open(&mut t).unwrap();
        assert_eq!(view.values(&t, 0).unwrap()[1], Value::Float64(3.0));
        t.accept_changes().unwrap();
        assert!(view.is_empty());
    }

    #[test]
    fn test_find() {
        let mut t = fruit();
        let mut view = DataView::new();
        view.open(&mut t).unwrap();
        assert!(view.find(&[Value::from("fig")]).is_err());
        view.set_sort(&t, Some("name")).unwrap();
        assert_eq!(view.find(&[Value::from("FIG")]).unwrap(), Some(1));
        assert_eq!(view.find(&[Value::from("kiwi")]).unwrap(), None);
        assert_eq!(view.find_rows(&[Value::from("pear")]).unwrap().len(), 1);
    }

    #[test]
    fn test_subscription_change_sets() {
        let mut t = fruit();
        let mut view = DataView::new().with_filter("price > 1");
        view.open(&mut t).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        view.subscribe(move |cs| sink.borrow_mut().push(cs.clone()));

        let kiwi = t.add(vec![Value::from("kiwi"), Value::Float64(5.0)]).unwrap();
        t.set_value(kiwi, 1, 0.0).unwrap();
        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].added, vec![kiwi]);
        assert_eq!(seen[0].current_result.len(), 3);
        assert_eq!(seen[1].removed, vec![kiwi]);
    }

    #[test]
    fn test_dropped_view_is_pruned() {
        let mut t = fruit();
        let mut view = DataView::new();
        view.open(&mut t).unwrap();
        drop(view);
        assert!(t.feed().is_empty());
        t.add(vec![Value::from("kiwi"), Value::Float64(5.0)]).unwrap();
    }

    #[test]
    fn test_to_table() {
        let mut t = fruit();
        t.add(vec![Value::from("fig"), Value::Float64(7.0)]).unwrap();
        let mut view = DataView::new().with_sort("name");
        view.open(&mut t).unwrap();
        let copy = view.to_table(&t, "names", true, &["name"]).unwrap();
        assert_eq!(copy.len(), 3);
        assert_eq!(copy.column_count(), 1);
        let first = copy.row_ids().next().unwrap();
        assert_eq!(copy.get(first, 0).unwrap(), &Value::from("apple"));
        assert!(!copy.has_changes());
    }

    #[test]
    fn test_settings_from_json() {
        let settings: ViewSettings = serde_json::from_str(r#"{"sort":"name DESC"}"#).unwrap();
        assert_eq!(settings.sort.as_deref(), Some("name DESC"));
        assert_eq!(settings.row_states, RowStateFilter::CURRENT_ROWS);
    }
}
