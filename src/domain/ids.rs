//! Monotonic distributed id generator.
//!
//! Ids are 63-bit integers laid out as `time | sequence | machine`: 39 bits of
//! elapsed time in 10 ms units since the epoch below, an 8-bit sequence within
//! one time unit, and a 16-bit machine id. Ids from one generator are strictly
//! increasing; ids from generators with distinct machine ids never collide.

use std::sync::{Mutex, PoisonError};

use time::{OffsetDateTime, macros::datetime};

use crate::domain::{entities::EntityId, error::DomainError};

const BITS_TIME: u32 = 39;
const BITS_SEQUENCE: u32 = 8;
const BITS_MACHINE: u32 = 16;

const SEQUENCE_MASK: u16 = (1 << BITS_SEQUENCE) - 1;
const TIME_UNIT_NANOS: i128 = 10_000_000;

/// Start of the id time range.
pub const ID_EPOCH: OffsetDateTime = datetime!(2023-01-01 00:00:01 UTC);

#[derive(Debug)]
struct GeneratorState {
    elapsed: i64,
    sequence: u16,
}

#[derive(Debug)]
pub struct IdGenerator {
    machine_id: u16,
    state: Mutex<GeneratorState>,
}

impl IdGenerator {
    pub fn new(machine_id: u16) -> Self {
        Self {
            machine_id,
            state: Mutex::new(GeneratorState {
                elapsed: 0,
                sequence: SEQUENCE_MASK,
            }),
        }
    }

    pub fn machine_id(&self) -> u16 {
        self.machine_id
    }

    /// Returns the next id, using the wall clock.
    pub fn next_id(&self) -> Result<EntityId, DomainError> {
        self.next_id_at(OffsetDateTime::now_utc())
    }

    /// Returns the next id as if the wall clock read `now`.
    ///
    /// When the sequence for the current time unit is exhausted the logical
    /// clock advances by one unit instead of waiting for the wall clock.
    pub fn next_id_at(&self, now: OffsetDateTime) -> Result<EntityId, DomainError> {
        let current = elapsed_units(now);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if state.elapsed < current {
            state.elapsed = current;
            state.sequence = 0;
        } else {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                state.elapsed += 1;
            }
        }

        if state.elapsed >= 1_i64 << BITS_TIME {
            return Err(DomainError::IdsExhausted);
        }

        Ok((state.elapsed << (BITS_SEQUENCE + BITS_MACHINE))
            | (i64::from(state.sequence) << BITS_MACHINE)
            | i64::from(self.machine_id))
    }
}

/// Splits an id into `(elapsed 10 ms units, sequence, machine id)`.
pub fn decompose(id: EntityId) -> (i64, u16, u16) {
    let elapsed = id >> (BITS_SEQUENCE + BITS_MACHINE);
    let sequence = ((id >> BITS_MACHINE) & i64::from(SEQUENCE_MASK)) as u16;
    let machine = (id & ((1 << BITS_MACHINE) - 1)) as u16;
    (elapsed, sequence, machine)
}

fn elapsed_units(now: OffsetDateTime) -> i64 {
    let nanos = (now - ID_EPOCH).whole_nanoseconds();
    (nanos / TIME_UNIT_NANOS).max(0) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn ids_increase_within_one_time_unit() {
        let generator = IdGenerator::new(7);
        let now = ID_EPOCH + Duration::seconds(10);
        let first = generator.next_id_at(now).expect("first id");
        let second = generator.next_id_at(now).expect("second id");
        assert!(second > first);

        let (elapsed, sequence, machine) = decompose(second);
        assert_eq!(elapsed, 1_000);
        assert_eq!(sequence, 1);
        assert_eq!(machine, 7);
    }

    #[test]
    fn sequence_overflow_advances_logical_clock() {
        let generator = IdGenerator::new(1);
        let now = ID_EPOCH + Duration::seconds(1);
        let mut last = 0;
        for _ in 0..=u32::from(SEQUENCE_MASK) + 1 {
            let id = generator.next_id_at(now).expect("id");
            assert!(id > last);
            last = id;
        }
        let (elapsed, sequence, _) = decompose(last);
        assert_eq!(elapsed, 101);
        assert_eq!(sequence, 0);
    }

    #[test]
    fn clock_moving_backwards_keeps_ids_monotonic() {
        let generator = IdGenerator::new(3);
        let later = generator
            .next_id_at(ID_EPOCH + Duration::seconds(5))
            .expect("later id");
        let earlier = generator
            .next_id_at(ID_EPOCH + Duration::seconds(1))
            .expect("earlier id");
        assert!(earlier > later);
    }

    #[test]
    fn distinct_machines_never_collide() {
        let now = ID_EPOCH + Duration::minutes(3);
        let a = IdGenerator::new(1).next_id_at(now).expect("a");
        let b = IdGenerator::new(2).next_id_at(now).expect("b");
        assert_ne!(a, b);
    }
}
