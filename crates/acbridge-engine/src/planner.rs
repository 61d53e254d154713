/*!
 * Read planner.
 *
 * Turns the registered entities into the list of bus reads issued on each
 * tick. With coalescing enabled, entities on the same device and register
 * table are sorted by address and merged into range reads while the hole
 * between two registers stays within `max_gap` and the merged span within
 * `max_batch`. The planner performs no I/O.
 */
use std::collections::BTreeMap;
use std::sync::Arc;

use acbridge_core::config::ControllerConfig;
use acbridge_devices::{Entity, RegisterType};

/// Planning limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerConfig {
    /// Merge reads at all
    pub coalesce: bool,
    /// Largest number of unread registers bridged inside one read
    pub max_gap: u16,
    /// Largest span of one merged read
    pub max_batch: u16,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            coalesce: true,
            max_gap: 0,
            max_batch: 64,
        }
    }
}

impl From<&ControllerConfig> for PlannerConfig {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            coalesce: config.coalesce,
            max_gap: config.max_gap,
            max_batch: config.max_batch.max(1),
        }
    }
}

/// One bus read and the entities served by it
#[derive(Debug, Clone)]
pub struct ReadBatch {
    /// Target device
    pub device_address: String,
    /// Register table
    pub register_type: RegisterType,
    /// First register read
    pub start_addr: u16,
    /// Number of registers (words or bits) read
    pub quantity: u16,
    /// Entities whose registers lie inside the range
    pub points: Vec<Arc<dyn Entity>>,
}

impl ReadBatch {
    /// Read covering exactly one entity's register
    pub fn single(entity: Arc<dyn Entity>) -> Self {
        let register = entity.register().clone();
        Self {
            device_address: register.device_address.clone(),
            register_type: register.register_type,
            start_addr: register.address,
            quantity: register.register_count(),
            points: vec![entity],
        }
    }

    /// One single-entity read per point, in address order
    pub fn split(&self) -> Vec<ReadBatch> {
        self.points.iter().cloned().map(ReadBatch::single).collect()
    }

    /// Offset of an entity's register inside the read payload
    pub fn offset_of(&self, entity: &dyn Entity) -> usize {
        usize::from(entity.register().address.saturating_sub(self.start_addr))
    }
}

/// Stateless read planner
pub struct ReadPlanner;

impl ReadPlanner {
    /// Plan the reads for one tick
    pub fn plan(config: PlannerConfig, entities: &[Arc<dyn Entity>]) -> Vec<ReadBatch> {
        if !config.coalesce {
            return entities.iter().cloned().map(ReadBatch::single).collect();
        }

        let mut groups: BTreeMap<(String, RegisterType), Vec<Arc<dyn Entity>>> = BTreeMap::new();
        for entity in entities {
            let register = entity.register();
            groups
                .entry((register.device_address.clone(), register.register_type))
                .or_default()
                .push(entity.clone());
        }

        let mut batches = Vec::with_capacity(entities.len() / 4 + 1);
        for (_, mut points) in groups {
            // stable sort keeps registration order for shared addresses
            points.sort_by_key(|e| e.register().address);

            let mut iter = points.into_iter();
            let Some(first) = iter.next() else { continue };
            let mut batch = ReadBatch::single(first);
            let mut batch_end = last_address(&batch);

            for next in iter {
                let next_start = u32::from(next.register().address);
                let next_end = next_start + u32::from(next.register().register_count()) - 1;
                let gap = next_start.saturating_sub(batch_end + 1);
                let span = batch_end.max(next_end) - u32::from(batch.start_addr) + 1;

                if gap <= u32::from(config.max_gap) && span <= u32::from(config.max_batch) {
                    batch_end = batch_end.max(next_end);
                    batch.quantity = span as u16;
                    batch.points.push(next);
                } else {
                    batches.push(batch);
                    batch = ReadBatch::single(next);
                    batch_end = last_address(&batch);
                }
            }
            batches.push(batch);
        }
        batches
    }
}

fn last_address(batch: &ReadBatch) -> u32 {
    u32::from(batch.start_addr) + u32::from(batch.quantity.max(1)) - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use acbridge_core::types::Id;
    use acbridge_devices::{RegisterConfig, Sensor, ValueType};

    fn sensor(id: &str, device: &str, address: u16, value_type: ValueType) -> Arc<dyn Entity> {
        Arc::new(Sensor::new(
            Id::from(id),
            id,
            RegisterConfig::new(device, address).with_value_type(value_type),
        ))
    }

    fn word(id: &str, address: u16) -> Arc<dyn Entity> {
        sensor(id, "20.00.00", address, ValueType::UnsignedWord)
    }

    #[test]
    fn test_contiguous_registers_merge() {
        let entities = vec![word("c", 0x12), word("a", 0x10), word("b", 0x11)];
        let batches = ReadPlanner::plan(PlannerConfig::default(), &entities);

        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.start_addr, 0x10);
        assert_eq!(batch.quantity, 3);
        let ids: Vec<String> = batch.points.iter().map(|e| e.id().to_string()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(batch.offset_of(batch.points[2].as_ref()), 2);
    }

    #[test]
    fn test_split_into_single_reads() {
        let entities = vec![
            word("a", 0x10),
            sensor("b", "20.00.00", 0x11, ValueType::Float32),
        ];
        let batches = ReadPlanner::plan(PlannerConfig::default(), &entities);
        assert_eq!(batches.len(), 1);

        let singles = batches[0].split();
        let ranges: Vec<(u16, u16)> = singles.iter().map(|b| (b.start_addr, b.quantity)).collect();
        assert_eq!(ranges, vec![(0x10, 1), (0x11, 2)]);
        assert!(singles.iter().all(|b| b.points.len() == 1));
    }

    #[test]
    fn test_gap_limits_merge() {
        let entities = vec![word("a", 0x10), word("b", 0x12)];

        let batches = ReadPlanner::plan(PlannerConfig::default(), &entities);
        assert_eq!(batches.len(), 2);

        let config = PlannerConfig {
            max_gap: 1,
            ..PlannerConfig::default()
        };
        let batches = ReadPlanner::plan(config, &entities);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].quantity, 3);
    }

    #[test]
    fn test_max_batch_splits() {
        let entities: Vec<_> = (0..5).map(|i| word(&format!("s{}", i), 0x100 + i)).collect();
        let config = PlannerConfig {
            max_batch: 2,
            ..PlannerConfig::default()
        };
        let batches = ReadPlanner::plan(config, &entities);
        let quantities: Vec<u16> = batches.iter().map(|b| b.quantity).collect();
        assert_eq!(quantities, vec![2, 2, 1]);
    }

    #[test]
    fn test_dwords_span_two_registers() {
        let entities = vec![
            sensor("energy", "20.00.00", 0x10, ValueType::UnsignedDWord),
            word("next", 0x12),
        ];
        let batches = ReadPlanner::plan(PlannerConfig::default(), &entities);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].quantity, 3);
    }

    #[test]
    fn test_groups_by_device_and_table() {
        let entities = vec![
            word("a", 0x10),
            sensor("b", "20.00.01", 0x11, ValueType::UnsignedWord),
            Arc::new(Sensor::new(
                Id::from("c"),
                "c",
                RegisterConfig::new("20.00.00", 0x11).with_register_type(RegisterType::Read),
            )) as Arc<dyn Entity>,
        ];
        let batches = ReadPlanner::plan(PlannerConfig::default(), &entities);
        assert_eq!(batches.len(), 3);
    }

    #[test]
    fn test_shared_register_single_read() {
        let entities = vec![word("a", 0x10), word("b", 0x10)];
        let batches = ReadPlanner::plan(PlannerConfig::default(), &entities);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].quantity, 1);
        assert_eq!(batches[0].points.len(), 2);
    }

    #[test]
    fn test_uncoalesced_plan() {
        let entities = vec![word("a", 0x10), word("b", 0x11)];
        let config = PlannerConfig {
            coalesce: false,
            ..PlannerConfig::default()
        };
        let batches = ReadPlanner::plan(config, &entities);
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.points.len() == 1));
    }
}
