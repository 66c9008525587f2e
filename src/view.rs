use std::{cell::RefCell, rc::Rc};

use crate::{Record, Store, StoreState, Subscription};


/// Returns `true` if the record's name contains `search`, ignoring case.
///
/// An empty search matches every record.
pub fn matches_search(record: &Record, search: &str) -> bool {
    search.is_empty() || record.name.to_lowercase().contains(&search.to_lowercase())
}

pub fn filter_records(records: &[Record], search: &str) -> Vec<Record> {
    records
        .iter()
        .filter(|r| matches_search(r, search))
        .cloned()
        .collect()
}

/// Records of a [`Store`] matching its current search text.
///
/// Kept up to date while alive. The filter is only recomputed when the record
/// sequence or the search text actually changed.
pub struct SearchResults {
    data: Rc<RefCell<SearchData>>,
    _subscription: Subscription,
}

impl SearchResults {
    pub fn new(store: &Store) -> Self {
        let data = Rc::new(RefCell::new(SearchData {
            input: None,
            results: Rc::new([]),
            computations: 0,
        }));
        let subscription = store.subscribe({
            let data = data.clone();
            move |state| data.borrow_mut().refresh(state)
        });
        Self {
            data,
            _subscription: subscription,
        }
    }

    pub fn results(&self) -> Rc<[Record]> {
        self.data.borrow().results.clone()
    }
    pub fn len(&self) -> usize {
        self.data.borrow().results.len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many times the filter has been evaluated.
    pub fn computations(&self) -> usize {
        self.data.borrow().computations
    }
}

struct SearchData {
    input: Option<(Rc<[Record]>, String)>,
    results: Rc<[Record]>,
    computations: usize,
}

impl SearchData {
    fn refresh(&mut self, state: &StoreState) {
        if let Some((records, search)) = &self.input {
            if Rc::ptr_eq(records, &state.records) && *search == state.search {
                return;
            }
        }
        self.results = filter_records(&state.records, &state.search).into();
        self.input = Some((state.records.clone(), state.search.clone()));
        self.computations += 1;
    }
}
