//! Abstraction over the record stored in a Table.

//  Projects a record onto the key it is indexed by.
pub trait Key {
    type Key;

    fn key(&self) -> &Self::Key;
}
