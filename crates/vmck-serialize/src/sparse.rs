//! Sparse map from `i32` keys to `i32` values.
//!
//! Open addressing over a power-of-two table with double hashing: the probe
//! step is derived from a second, independent mix of the key and forced odd,
//! so a probe sequence visits every slot before cycling. Absent keys answer
//! a configurable default value; an entry that was explicitly `set` to the
//! default is still a real entry (it occupies a slot) until a wipe pass
//! reclaims it.
//!
//! Growth policy: when occupancy crosses the wipe threshold, entries whose
//! value has returned to the default are dropped first; capacity only
//! doubles if the surviving entries still exceed the stricter rehash
//! threshold.

use tracing::debug;

const MAX_LOAD_WIPE: f64 = 0.6;
const MAX_LOAD_REHASH: f64 = 0.4;
const DEFAULT_POW: u32 = 10;

#[derive(Debug, Clone)]
pub struct SparseIntMap {
    slots: Vec<Option<(i32, i32)>>,
    /// Occupied slots, entries holding the default value included.
    count: usize,
    pow: u32,
    default: i32,
    next_wipe: usize,
    next_rehash: usize,
}

/// Primary mix, position within the table.
#[inline]
fn mix1(key: i32) -> u32 {
    let mut x = key as u32 ^ 0x510f_b60d;
    let mut y = 0x9e37_79b9u32;
    y = y.wrapping_add((x >> 8).wrapping_add(x << 3));
    x ^= (y >> 5).wrapping_add(y << 2);
    y.wrapping_sub(x)
}

/// Secondary mix, probe step. Independent of `mix1` so keys colliding on
/// position still diverge on step.
#[inline]
fn mix2(key: i32) -> u32 {
    let mut x = key as u32;
    x ^= x >> 16;
    x = x.wrapping_mul(0x85eb_ca6b);
    x ^= x >> 13;
    x = x.wrapping_mul(0xc2b2_ae35);
    x ^= x >> 16;
    x
}

impl SparseIntMap {
    /// A map answering `default` for absent keys, with the default initial
    /// capacity.
    pub fn new(default: i32) -> Self {
        Self::with_capacity_pow(DEFAULT_POW, default)
    }

    /// A map with initial capacity `2^pow`.
    pub fn with_capacity_pow(pow: u32, default: i32) -> Self {
        let mut m = Self {
            slots: vec![None; 1usize << pow],
            count: 0,
            pow,
            default,
            next_wipe: 0,
            next_rehash: 0,
        };
        m.recompute_thresholds();
        m
    }

    fn recompute_thresholds(&mut self) {
        let cap = self.slots.len() as f64;
        self.next_wipe = (MAX_LOAD_WIPE * cap) as usize;
        self.next_rehash = (MAX_LOAD_REHASH * cap) as usize;
    }

    #[inline]
    fn mask(&self) -> usize {
        self.slots.len() - 1
    }

    #[inline]
    fn probe_step(&self, key: i32) -> usize {
        (mix2(key) as usize) | 1
    }

    /// First empty slot on the key's probe sequence. Only valid when the
    /// key is known absent and the table is not full.
    fn insert_pos(&self, key: i32) -> usize {
        let mut pos = mix1(key) as usize & self.mask();
        let step = self.probe_step(key);
        while self.slots[pos].is_some() {
            pos = (pos + step) & self.mask();
        }
        pos
    }

    /// Value for `key`, or the default if it was never set (or wiped).
    pub fn get(&self, key: i32) -> i32 {
        let mut pos = mix1(key) as usize & self.mask();
        let step = self.probe_step(key);
        loop {
            match self.slots[pos] {
                None => return self.default,
                Some((k, v)) if k == key => return v,
                Some(_) => pos = (pos + step) & self.mask(),
            }
        }
    }

    pub fn set(&mut self, key: i32, val: i32) {
        let mut pos = mix1(key) as usize & self.mask();
        let step = self.probe_step(key);
        loop {
            match &mut self.slots[pos] {
                Some((k, v)) if *k == key => {
                    *v = val;
                    return;
                }
                Some(_) => pos = (pos + step) & self.mask(),
                None => break,
            }
        }

        // key absent; reclaim or grow before claiming a slot if crowded
        if self.count + 1 >= self.next_wipe {
            self.reduce();
            pos = self.insert_pos(key);
        }
        self.slots[pos] = Some((key, val));
        self.count += 1;
    }

    /// Wipe default-valued entries; double capacity only if still too full.
    fn reduce(&mut self) {
        let live = self
            .slots
            .iter()
            .flatten()
            .filter(|(_, v)| *v != self.default)
            .count();

        if live + 1 >= self.next_rehash {
            self.pow += 1;
            debug!(pow = self.pow, live, "sparse map growing");
        } else {
            debug!(reclaimed = self.count - live, "sparse map wipe pass");
        }

        let old = std::mem::replace(&mut self.slots, vec![None; 1usize << self.pow]);
        self.recompute_thresholds();
        self.count = 0;
        for (k, v) in old.into_iter().flatten() {
            if v == self.default {
                continue;
            }
            let pos = self.insert_pos(k);
            self.slots[pos] = Some((k, v));
            self.count += 1;
        }
    }

    /// Drop all entries, keeping capacity.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
        self.count = 0;
    }

    /// Number of occupied slots (entries set to the default included).
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn default_value(&self) -> i32 {
        self.default
    }
}
