// Copyright (c) 2017-2021 Fabian Schuiki

//! Dense arenas addressed by opaque keys.
//!
//! The IR stores its instructions, values, blocks, and functions in
//! `PrimaryTable`s, which hand out a fresh key for every entry and never
//! reuse a key once its entry is removed. `SecondaryTable`s attach extra data
//! to keys handed out by some primary table. Both store their entries in a
//! vector indexed by the key, such that iteration follows key order.

use rayon::prelude::*;
use std::{
    marker::PhantomData,
    ops::{Index, IndexMut},
};

/// An opaque key to uniquely identify a table entry.
pub trait TableKey: Copy {
    /// Create a new table key from an index.
    fn new(index: usize) -> Self;
    /// Return the index wrapped within this table key.
    fn index(self) -> usize;
}

/// Declare opaque key types for use with tables.
///
/// Each key displays as its prefix followed by its index, e.g. `v12`.
#[macro_export]
macro_rules! impl_table_key {
    ($($(#[$m:meta])* struct $name:ident($ity:ty) as $prefix:expr;)*) => {
        $(
            $(#[$m])*
            #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
            pub struct $name($ity);

            impl std::fmt::Display for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                    write!(f, "{}{}", $prefix, self.0)
                }
            }

            impl std::fmt::Debug for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                    std::fmt::Display::fmt(self, f)
                }
            }

            impl $crate::table::TableKey for $name {
                fn new(index: usize) -> Self {
                    $name(index as $ity)
                }

                fn index(self) -> usize {
                    self.0 as usize
                }
            }
        )*
    };
}

/// Forward `Index` and `IndexMut` on a struct to one of its tables.
#[macro_export]
macro_rules! impl_table_indexing {
    ($target:path, $($field:ident).+, $key:ty, $value:ty) => {
        impl std::ops::Index<$key> for $target {
            type Output = $value;

            fn index(&self, key: $key) -> &$value {
                &self.$($field).*[key]
            }
        }

        impl std::ops::IndexMut<$key> for $target {
            fn index_mut(&mut self, key: $key) -> &mut $value {
                &mut self.$($field).*[key]
            }
        }
    };
}

/// A table that allocates keys for the entries added to it.
#[derive(Clone, Serialize, Deserialize)]
pub struct PrimaryTable<I, V> {
    slots: Vec<Option<V>>,
    len: usize,
    #[serde(skip)]
    key: PhantomData<I>,
}

impl<I, V> PrimaryTable<I, V> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            slots: vec![],
            len: 0,
            key: PhantomData,
        }
    }

    /// Return an upper bound on the indices of keys handed out so far.
    ///
    /// Useful to size dense side tables indexed by key.
    pub fn bound(&self) -> usize {
        self.slots.len()
    }

    /// Return the number of entries in the table.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Return a parallel iterator over the entries in the table.
    pub fn par_values_mut<'a>(&'a mut self) -> impl ParallelIterator<Item = &'a mut V> + 'a
    where
        V: Send,
    {
        self.slots.par_iter_mut().filter_map(Option::as_mut)
    }
}

impl<I, V> Default for PrimaryTable<I, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: TableKey, V> PrimaryTable<I, V> {
    /// Add an entry and return its key.
    pub fn add(&mut self, value: V) -> I {
        let key = I::new(self.slots.len());
        self.slots.push(Some(value));
        self.len += 1;
        key
    }

    /// Remove an entry.
    ///
    /// Panics if the entry does not exist. The key is not handed out again.
    pub fn remove(&mut self, key: I) -> V {
        let value = self
            .slots
            .get_mut(key.index())
            .and_then(Option::take)
            .expect("key not in table");
        self.len -= 1;
        value
    }

    /// Check whether an entry exists in the table.
    pub fn contains(&self, key: I) -> bool {
        self.get(key).is_some()
    }

    /// Get an entry from the table, if one exists.
    pub fn get(&self, key: I) -> Option<&V> {
        self.slots.get(key.index()).and_then(Option::as_ref)
    }

    /// Return an iterator over the keys and entries in key order.
    pub fn iter<'a>(&'a self) -> impl Iterator<Item = (I, &'a V)> + 'a {
        self.slots
            .iter()
            .enumerate()
            .flat_map(|(index, slot)| slot.as_ref().map(|v| (I::new(index), v)))
    }

    /// Return a mutable iterator over the keys and entries in key order.
    pub fn iter_mut<'a>(&'a mut self) -> impl Iterator<Item = (I, &'a mut V)> + 'a {
        self.slots
            .iter_mut()
            .enumerate()
            .flat_map(|(index, slot)| slot.as_mut().map(|v| (I::new(index), v)))
    }

    /// Return an iterator over the keys in the table.
    pub fn keys<'a>(&'a self) -> impl Iterator<Item = I> + 'a {
        self.iter().map(|(key, _)| key)
    }

    /// Return an iterator over the entries in the table.
    pub fn values<'a>(&'a self) -> impl Iterator<Item = &'a V> + 'a {
        self.iter().map(|(_, value)| value)
    }
}

impl<I: TableKey, V> Index<I> for PrimaryTable<I, V> {
    type Output = V;

    fn index(&self, key: I) -> &V {
        self.get(key).expect("key not in table")
    }
}

impl<I: TableKey, V> IndexMut<I> for PrimaryTable<I, V> {
    fn index_mut(&mut self, key: I) -> &mut V {
        self.slots
            .get_mut(key.index())
            .and_then(Option::as_mut)
            .expect("key not in table")
    }
}

/// A table that attaches data to the keys of a primary table.
#[derive(Clone, Serialize, Deserialize)]
pub struct SecondaryTable<I, V> {
    slots: Vec<Option<V>>,
    #[serde(skip)]
    key: PhantomData<I>,
}

impl<I, V> SecondaryTable<I, V> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            slots: vec![],
            key: PhantomData,
        }
    }
}

impl<I: TableKey, V> SecondaryTable<I, V> {
    /// Attach data to a key.
    ///
    /// Panics if the key already carries data.
    pub fn add(&mut self, key: I, value: V) {
        let index = key.index();
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }
        if self.slots[index].replace(value).is_some() {
            panic!("key already in table");
        }
    }

    /// Detach the data from a key.
    pub fn remove(&mut self, key: I) -> Option<V> {
        self.slots.get_mut(key.index()).and_then(Option::take)
    }

    /// Check whether a key carries data.
    pub fn contains(&self, key: I) -> bool {
        self.get(key).is_some()
    }

    /// Get the data attached to a key, if any.
    pub fn get(&self, key: I) -> Option<&V> {
        self.slots.get(key.index()).and_then(Option::as_ref)
    }

    /// Get the data attached to a key mutably, if any.
    pub fn get_mut(&mut self, key: I) -> Option<&mut V> {
        self.slots.get_mut(key.index()).and_then(Option::as_mut)
    }
}

impl<I, V> Default for SecondaryTable<I, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: TableKey, V> Index<I> for SecondaryTable<I, V> {
    type Output = V;

    fn index(&self, key: I) -> &V {
        self.get(key).expect("key not in secondary table")
    }
}

impl<I: TableKey, V> IndexMut<I> for SecondaryTable<I, V> {
    fn index_mut(&mut self, key: I) -> &mut V {
        self.get_mut(key).expect("key not in secondary table")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl_table_key! {
        struct Key(u32) as "k";
    }

    #[test]
    fn keys_are_not_reused() {
        let mut tbl = PrimaryTable::<Key, &str>::new();
        let a = tbl.add("a");
        let b = tbl.add("b");
        assert_eq!(tbl.remove(a), "a");
        let c = tbl.add("c");
        assert_ne!(a, c);
        assert_eq!(tbl.len(), 2);
        assert_eq!(tbl.bound(), 3);
        assert_eq!(tbl[b], "b");
        assert!(!tbl.contains(a));
        assert_eq!(tbl.keys().collect::<Vec<_>>(), vec![b, c]);
    }

    #[test]
    fn secondary_grows_on_demand() {
        let mut tbl = SecondaryTable::<Key, u8>::new();
        tbl.add(Key(4), 1);
        assert!(!tbl.contains(Key(2)));
        assert_eq!(tbl[Key(4)], 1);
        tbl[Key(4)] += 1;
        assert_eq!(tbl.remove(Key(4)), Some(2));
        assert_eq!(tbl.remove(Key(4)), None);
    }

    #[test]
    #[should_panic(expected = "key already in table")]
    fn secondary_rejects_duplicates() {
        let mut tbl = SecondaryTable::<Key, u8>::new();
        tbl.add(Key(0), 1);
        tbl.add(Key(0), 2);
    }
}
