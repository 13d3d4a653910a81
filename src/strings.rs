//! Backing storage for Atto's immutable string values.
//!
//! [Value][crate::value::Value] is `Copy`, so a string value is just a
//! `&'static str` pointing into a [StringTable] installed for the current
//! thread. [ActiveStrings] is the RAII token that proves a table is
//! installed: compilation and execution both happen inside its lifetime, and
//! dropping it throws every stored string away. There is no collector here —
//! strings accumulate until the table is uninstalled, which for this
//! single-chunk interpreter is the end of the `interpret` call.

use std::cell::RefCell;
use std::marker::PhantomData;

/// Owns the text of every string value created during one interpretation.
#[derive(Debug, Default)]
pub struct StringTable {
    storage: Vec<String>,
}

/// A token that indicates a [StringTable] is installed for this thread.
/// When this token is dropped, the table is uninstalled and dropped with it.
#[derive(Debug)]
pub struct ActiveStrings {
    // Keeps the token out of Send/Sync: the table it guards is thread-local.
    _not_send: PhantomData<*const ()>,
}

thread_local! {
    /// The installed table, if any. At most one per thread at a time.
    static ACTIVE: RefCell<Option<StringTable>> = const { RefCell::new(None) };
}

impl StringTable {
    /// Takes ownership of `text` and hands back a reference to it.
    ///
    /// # Safety
    ///
    /// The returned reference is only valid while this table is alive. A
    /// `String`'s heap buffer never moves, even when `storage` reallocates,
    /// and entries are never removed, so the reference holds until the table
    /// is dropped — which [ActiveStrings] delays until the token goes away.
    fn store(&mut self, text: String) -> &'static str {
        self.storage.push(text);
        let stored: &str = self.storage.last().expect("an entry was just pushed");
        unsafe { std::mem::transmute::<&str, &'static str>(stored) }
    }

    #[cfg(test)]
    fn n_strings(&self) -> usize {
        self.storage.len()
    }
}

impl ActiveStrings {
    /// Installs a fresh [StringTable] for this thread.
    #[must_use]
    pub fn install() -> ActiveStrings {
        ACTIVE.with(|table| {
            let mut table = table.borrow_mut();
            debug_assert!(table.is_none(), "a string table is already installed");
            *table = Some(StringTable::default());
        });
        ActiveStrings {
            _not_send: PhantomData,
        }
    }

    /// Adds a string to storage, returning a reference that lives as long as
    /// this token.
    ///
    /// # Panics
    ///
    /// Panics if the token's table has been replaced by a nested `install`.
    pub fn store(&self, text: String) -> &'static str {
        store(text)
    }

    #[cfg(test)]
    fn n_strings() -> usize {
        ACTIVE.with(|table| {
            table
                .borrow()
                .as_ref()
                .expect("Tried to count strings, but no table is installed")
                .n_strings()
        })
    }
}

/// Stores into whichever table is installed on this thread.
///
/// # Panics
///
/// Panics when no table is installed.
pub(crate) fn store(text: String) -> &'static str {
    ACTIVE.with(|table| {
        table
            .borrow_mut()
            .as_mut()
            .expect("Tried to store a string, but no string table is installed")
            .store(text)
    })
}

impl Drop for ActiveStrings {
    fn drop(&mut self) {
        // Uninstall the table by taking ownership.
        ACTIVE.with(|table| {
            table
                .borrow_mut()
                .take()
                .expect("Dropping the active string table, but it's not installed")
        });
        // StringTable dropped here!
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn store_hands_back_the_same_text() {
        let active = ActiveStrings::install();
        let s = active.store("hello".to_owned());
        assert_eq!("hello", s);
        assert_eq!(1, ActiveStrings::n_strings());
    }

    #[test]
    fn storage_grows_without_invalidating_earlier_entries() {
        let active = ActiveStrings::install();
        let first = active.store("🦀".to_owned());
        for i in 0..100 {
            active.store(format!("filler {i}"));
        }
        assert_eq!("🦀", first);
        assert_eq!(101, ActiveStrings::n_strings());
    }

    #[test]
    #[should_panic(expected = "no string table is installed")]
    fn storing_without_a_table_panics() {
        store("🎷".to_owned());
    }

    #[test]
    #[should_panic(expected = "no string table is installed")]
    fn storing_after_the_token_is_dropped_panics() {
        {
            let active = ActiveStrings::install();
            active.store("🍕".to_owned());
        }

        store("too late".to_owned());
    }
}
