// archetype.rs - Columnar storage for one component/tag combination
//
// An archetype owns one row per component type, in canonical (size, key)
// order. Every row has `column_count` slots and column `c` is live in all
// rows or in none, as recorded by `initialized`. Destroyed columns become
// holes that later spawns fill before the rows grow again.

use super::{Bitmask, ErasedBuffer};
use crate::ecs::{
    ArchetypeId, CompTypeId, DynamicValue, ReferenceCollector, TypeDescriptor,
};
use std::fmt;

/// One component row: `column_count` slots of a single type.
pub struct ComponentRow {
    component: CompTypeId,
    descriptor: &'static TypeDescriptor,
    buffer: ErasedBuffer,
}

impl ComponentRow {
    #[inline]
    pub fn component(&self) -> CompTypeId {
        self.component
    }

    #[inline]
    pub fn descriptor(&self) -> &'static TypeDescriptor {
        self.descriptor
    }
}

pub struct Archetype {
    id: ArchetypeId,
    rows: Vec<ComponentRow>,
    column_count: usize,
    initialized: Bitmask,
    signature: Bitmask,
    num_components: usize,
}

impl Archetype {
    /// Build an empty archetype. `rows` must already be in canonical order and
    /// `signature` must cover every registered component and tag.
    pub(crate) fn new(
        id: ArchetypeId,
        rows: Vec<(CompTypeId, &'static TypeDescriptor)>,
        signature: Bitmask,
        num_components: usize,
    ) -> Self {
        debug_assert!(rows
            .windows(2)
            .all(|w| (w[0].1.size(), w[0].1.key()) < (w[1].1.size(), w[1].1.key())));
        debug_assert_eq!(
            rows.len(),
            signature.iter_ones().take_while(|&b| b < num_components).count()
        );

        Self {
            id,
            rows: rows
                .into_iter()
                .map(|(component, descriptor)| ComponentRow {
                    component,
                    descriptor,
                    buffer: ErasedBuffer::new(descriptor.layout()),
                })
                .collect(),
            column_count: 0,
            initialized: Bitmask::default(),
            signature,
            num_components,
        }
    }

    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// Components first, then tags offset by the number of registered components.
    #[inline]
    pub fn signature(&self) -> &Bitmask {
        &self.signature
    }

    #[inline]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// Number of live columns.
    pub fn live_count(&self) -> usize {
        self.initialized.count_ones()
    }

    pub fn rows(&self) -> &[ComponentRow] {
        &self.rows
    }

    pub fn row(&self, row: usize) -> &ComponentRow {
        self.check_row(row);
        &self.rows[row]
    }

    #[inline]
    pub fn is_valid_row(&self, row: usize) -> bool {
        row < self.rows.len()
    }

    #[inline]
    pub fn is_valid_column(&self, column: usize) -> bool {
        column < self.column_count
    }

    pub fn is_column_initialized(&self, column: usize) -> bool {
        self.check_column(column);
        self.initialized.test(column)
    }

    pub fn has_component(&self, component: CompTypeId) -> bool {
        component.index() < self.num_components && self.signature.test(component.index())
    }

    /// Row holding `component`. Rows follow id order, so the row index is the
    /// number of present components with a lower id.
    ///
    /// Panics if the archetype has no such component.
    pub fn get_row_for(&self, component: CompTypeId) -> usize {
        assert!(
            self.has_component(component),
            "{} has no row for {component}",
            self.id
        );
        let row = self.signature.count_ones_below(component.index());
        debug_assert_eq!(self.rows[row].component, component);
        row
    }

    pub fn find_row_for(&self, component: CompTypeId) -> Option<usize> {
        self.has_component(component)
            .then(|| self.signature.count_ones_below(component.index()))
    }

    /// First column at or after `start` without live values.
    pub fn find_first_uninitialized_column(&self, start: usize) -> Option<usize> {
        self.initialized.first_clear_from(start)
    }

    /// Grow every row by exactly `count` columns. Nothing is constructed and
    /// the new columns are not live. Returns the first new column.
    pub fn add_uninitialized(&mut self, count: usize) -> usize {
        let first = self.column_count;
        let total = first + count;
        for row in &mut self.rows {
            row.buffer.resize(total);
        }
        self.initialized.grow(count);
        self.column_count = total;
        tracing::trace!(archetype = %self.id, columns = total, "grew archetype");
        first
    }

    /// Grow by `count` columns and default-construct all of them.
    pub fn add_defaulted(&mut self, count: usize) -> usize {
        let first = self.add_uninitialized(count);
        for row in &self.rows {
            // Safety: the new columns were just allocated.
            unsafe { row.descriptor.construct_n(row.buffer.at(first), count) };
        }
        for column in first..first + count {
            self.initialized.set(column);
        }
        first
    }

    /// Fill the first hole, or grow by `alloc_chunk_size` columns when there is
    /// none. Each row is default-constructed and then, if `source` is given,
    /// assigned from the value at the same position in `source`.
    pub fn add_at_first_uninitialized(
        &mut self,
        source: Option<&[DynamicValue]>,
        alloc_chunk_size: usize,
    ) -> usize {
        assert!(alloc_chunk_size > 0, "alloc_chunk_size must be at least 1");
        if let Some(source) = source {
            assert_eq!(
                source.len(),
                self.rows.len(),
                "copy source has {} values for {} rows",
                source.len(),
                self.rows.len()
            );
        }

        let column = match self.find_first_uninitialized_column(0) {
            Some(column) => column,
            None => self.add_uninitialized(alloc_chunk_size),
        };

        for (index, row) in self.rows.iter().enumerate() {
            let dst = row.buffer.at(column);
            // Safety: the column is not live in any row.
            unsafe { row.descriptor.construct(dst) };
            if let Some(value) = source.map(|s| &s[index]) {
                let src = match (value.descriptor(), value.as_ptr()) {
                    (Some(d), Some(src)) if d.same_type(row.descriptor) => src,
                    _ => panic!(
                        "copy source {index} does not hold a {}",
                        row.descriptor.name()
                    ),
                };
                // Safety: dst was just constructed; src is a live value of the
                // same type in a separate allocation.
                unsafe { row.descriptor.copy(dst, src) };
            }
        }
        self.initialized.set(column);
        column
    }

    /// Flag `column` live after the caller wrote every row through
    /// [`ptr_at`](Self::ptr_at).
    ///
    /// # Safety
    /// Every row must hold a live value at `column`.
    pub unsafe fn mark_initialized(&mut self, column: usize) {
        self.check_column(column);
        debug_assert!(!self.initialized.test(column));
        self.initialized.set(column);
    }

    /// Destroy the values at `column` in every row. Returns false if the
    /// column was not live. Other columns never move.
    pub fn destruct_at(&mut self, column: usize) -> bool {
        self.check_column(column);
        if !self.initialized.test(column) {
            return false;
        }
        for row in &self.rows {
            // Safety: the column is live.
            unsafe { row.descriptor.destroy(row.buffer.at(column)) };
        }
        self.initialized.clear(column);
        true
    }

    /// Whether the first `n_bits` signature bits of `self` are all present
    /// in `other`.
    pub fn has_same_set_identifier_flags(&self, other: &Archetype, n_bits: usize) -> bool {
        self.signature.is_subset_of(&other.signature, n_bits)
    }

    /// Raw slot address. Valid until the archetype next grows.
    pub fn ptr_at(&self, row: usize, column: usize) -> *mut u8 {
        self.check_row(row);
        self.check_column(column);
        self.rows[row].buffer.at(column)
    }

    /// Typed access. `None` when the column is not live.
    pub fn get<T: 'static>(&self, row: usize, column: usize) -> Option<&T> {
        let ptr = self.typed_ptr::<T>(row, column)?;
        // Safety: live and type-checked.
        Some(unsafe { &*ptr })
    }

    pub fn get_mut<T: 'static>(&mut self, row: usize, column: usize) -> Option<&mut T> {
        let ptr = self.typed_ptr::<T>(row, column)?;
        // Safety: live, type-checked, and `self` is borrowed mutably.
        Some(unsafe { &mut *ptr })
    }

    /// Live columns in ascending order.
    pub fn initialized_columns(&self) -> impl Iterator<Item = usize> + '_ {
        self.initialized.iter_ones()
    }

    pub fn for_each_initialized_column(&self, mut f: impl FnMut(usize)) {
        self.initialized_columns().for_each(&mut f);
    }

    /// Visit live columns from `start` until `f` returns false.
    pub fn for_each_initialized_column_from(&self, start: usize, mut f: impl FnMut(usize) -> bool) {
        let mut next = self.initialized.first_set_from(start);
        while let Some(column) = next {
            if !f(column) {
                break;
            }
            next = self.initialized.first_set_from(column + 1);
        }
    }

    /// Report each row's type and the references held by every live value.
    pub fn collect_references(&self, collector: &mut dyn ReferenceCollector) {
        for row in &self.rows {
            collector.add_type(row.descriptor);
            for column in self.initialized.iter_ones() {
                // Safety: the column is live.
                unsafe { row.descriptor.report_references(row.buffer.at(column), collector) };
            }
        }
    }

    fn typed_ptr<T: 'static>(&self, row: usize, column: usize) -> Option<*mut T> {
        self.check_row(row);
        self.check_column(column);
        let descriptor = self.rows[row].descriptor;
        assert!(
            descriptor.is::<T>(),
            "row {row} of {} holds {}, not {}",
            self.id,
            descriptor.name(),
            std::any::type_name::<T>()
        );
        self.initialized
            .test(column)
            .then(|| self.rows[row].buffer.at(column).cast::<T>())
    }

    #[inline]
    fn check_row(&self, row: usize) {
        assert!(
            row < self.rows.len(),
            "row {row} out of range for {} ({} rows)",
            self.id,
            self.rows.len()
        );
    }

    #[inline]
    fn check_column(&self, column: usize) {
        assert!(
            column < self.column_count,
            "column {column} out of range for {} ({} columns)",
            self.id,
            self.column_count
        );
    }
}

impl Drop for Archetype {
    fn drop(&mut self) {
        for row in &self.rows {
            for column in self.initialized.iter_ones() {
                // Safety: the column is live.
                unsafe { row.descriptor.destroy(row.buffer.at(column)) };
            }
        }
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archetype")
            .field("id", &self.id)
            .field(
                "rows",
                &self.rows.iter().map(|r| r.descriptor.name()).collect::<Vec<_>>(),
            )
            .field("columns", &self.column_count)
            .field("live", &self.live_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::define_component;
    use crate::ecs::{descriptor_of, Reflect};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default, PartialEq, Debug)]
    struct Small(u32);
    define_component!(Small, 1, "Small");

    #[derive(Clone, Default, PartialEq, Debug)]
    struct Big([f32; 4]);
    define_component!(Big, 2, "Big");

    #[derive(Clone, Default, Debug)]
    struct Counted(Option<Arc<AtomicUsize>>);

    impl PartialEq for Counted {
        fn eq(&self, _other: &Self) -> bool {
            true
        }
    }

    impl Drop for Counted {
        fn drop(&mut self) {
            if let Some(drops) = &self.0 {
                drops.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
    define_component!(Counted, 3, "Counted");

    /// Registry ids: Small = 0, Big = 1 (ordered by size).
    fn small_big() -> Archetype {
        let mut signature = Bitmask::with_len(2);
        signature.set(0);
        signature.set(1);
        Archetype::new(
            ArchetypeId::new(0),
            vec![
                (CompTypeId::new(0), descriptor_of::<Small>()),
                (CompTypeId::new(1), descriptor_of::<Big>()),
            ],
            signature,
            2,
        )
    }

    fn only_big() -> Archetype {
        let mut signature = Bitmask::with_len(2);
        signature.set(1);
        Archetype::new(
            ArchetypeId::new(1),
            vec![(CompTypeId::new(1), descriptor_of::<Big>())],
            signature,
            2,
        )
    }

    #[test]
    fn test_row_lookup_counts_lower_bits() {
        let both = small_big();
        assert_eq!(both.get_row_for(CompTypeId::new(0)), 0);
        assert_eq!(both.get_row_for(CompTypeId::new(1)), 1);
        assert!(both.row(1).descriptor().is::<Big>());

        let big = only_big();
        assert_eq!(big.get_row_for(CompTypeId::new(1)), 0);
        assert_eq!(big.find_row_for(CompTypeId::new(0)), None);
    }

    #[test]
    #[should_panic(expected = "has no row for")]
    fn test_missing_row_faults() {
        only_big().get_row_for(CompTypeId::new(0));
    }

    #[test]
    fn test_chunked_growth_and_hole_reuse() {
        let mut archetype = small_big();
        let first = archetype.add_at_first_uninitialized(None, 4);
        let second = archetype.add_at_first_uninitialized(None, 4);
        let third = archetype.add_at_first_uninitialized(None, 4);
        assert_eq!((first, second, third), (0, 1, 2));
        assert_eq!(archetype.column_count(), 4);

        assert!(archetype.destruct_at(1));
        assert!(!archetype.destruct_at(1));
        assert_eq!(archetype.find_first_uninitialized_column(0), Some(1));
        assert_eq!(archetype.add_at_first_uninitialized(None, 4), 1);
        assert_eq!(archetype.add_at_first_uninitialized(None, 4), 3);
        assert_eq!(archetype.add_at_first_uninitialized(None, 4), 4);
        assert_eq!(archetype.column_count(), 8);
        assert_eq!(archetype.live_count(), 5);
    }

    #[test]
    fn test_copy_source() {
        let mut archetype = small_big();
        let source = [
            DynamicValue::make(Small(9)),
            DynamicValue::make(Big([1.0, 2.0, 3.0, 4.0])),
        ];
        let column = archetype.add_at_first_uninitialized(Some(&source), 1);
        assert_eq!(archetype.get::<Small>(0, column), Some(&Small(9)));
        assert_eq!(archetype.get::<Big>(1, column).map(|b| b.0[3]), Some(4.0));
    }

    #[test]
    fn test_uninitialized_columns_read_as_none() {
        let mut archetype = small_big();
        let first = archetype.add_uninitialized(3);
        assert_eq!(first, 0);
        assert_eq!(archetype.column_count(), 3);
        assert_eq!(archetype.live_count(), 0);
        assert_eq!(archetype.get::<Small>(0, 2), None);

        unsafe {
            archetype.ptr_at(0, 2).cast::<Small>().write(Small(5));
            archetype.ptr_at(1, 2).cast::<Big>().write(Big::default());
            archetype.mark_initialized(2);
        }
        assert_eq!(archetype.get::<Small>(0, 2), Some(&Small(5)));
        assert_eq!(archetype.find_first_uninitialized_column(2), None);
        assert_eq!(archetype.find_first_uninitialized_column(1), Some(1));
    }

    #[test]
    fn test_add_defaulted() {
        let mut archetype = small_big();
        let first = archetype.add_defaulted(2);
        assert_eq!(first, 0);
        assert_eq!(archetype.initialized_columns().collect::<Vec<_>>(), vec![0, 1]);
        if let Some(small) = archetype.get_mut::<Small>(0, 1) {
            small.0 = 3;
        }
        assert_eq!(archetype.get::<Small>(0, 1), Some(&Small(3)));
    }

    #[test]
    fn test_for_each_from_stops_early() {
        let mut archetype = small_big();
        archetype.add_defaulted(5);
        archetype.destruct_at(2);
        let mut seen = Vec::new();
        archetype.for_each_initialized_column_from(1, |c| {
            seen.push(c);
            c < 3
        });
        assert_eq!(seen, vec![1, 3]);
    }

    #[test]
    fn test_subset_flags() {
        let both = small_big();
        let big = only_big();
        assert!(big.has_same_set_identifier_flags(&both, 2));
        assert!(!both.has_same_set_identifier_flags(&big, 2));
        assert!(both.has_same_set_identifier_flags(&both, 2));
    }

    #[test]
    fn test_drop_destroys_live_values_only() {
        let drops = Arc::new(AtomicUsize::new(0));
        {
            let mut signature = Bitmask::with_len(1);
            signature.set(0);
            let mut archetype = Archetype::new(
                ArchetypeId::new(0),
                vec![(CompTypeId::new(0), Counted::descriptor())],
                signature,
                1,
            );
            let source = [DynamicValue::make(Counted(Some(drops.clone())))];
            for _ in 0..3 {
                archetype.add_at_first_uninitialized(Some(&source), 8);
            }
            archetype.destruct_at(0);
            assert_eq!(drops.load(Ordering::SeqCst), 1);
        }
        // Two live columns in the archetype plus the source value.
        assert_eq!(drops.load(Ordering::SeqCst), 4);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_column_out_of_range() {
        small_big().ptr_at(0, 0);
    }
}
