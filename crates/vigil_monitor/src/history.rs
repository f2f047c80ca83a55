//! Bounded per-channel reading history
//!
//! Keeps the most recent readings of each channel for averaged metrics.
//! Oldest readings are dropped once a channel reaches capacity.

use std::collections::VecDeque;
use vigil_core::{Channel, PerChannel};

#[derive(Debug, Clone)]
pub struct ReadingHistory {
    capacity: usize,
    thermal: VecDeque<f64>,
    power: VecDeque<f64>,
    neural: VecDeque<f64>,
}

impl ReadingHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            thermal: VecDeque::new(),
            power: VecDeque::new(),
            neural: VecDeque::new(),
        }
    }

    fn buffer(&self, channel: Channel) -> &VecDeque<f64> {
        match channel {
            Channel::Thermal => &self.thermal,
            Channel::Power => &self.power,
            Channel::Neural => &self.neural,
        }
    }

    fn buffer_mut(&mut self, channel: Channel) -> &mut VecDeque<f64> {
        match channel {
            Channel::Thermal => &mut self.thermal,
            Channel::Power => &mut self.power,
            Channel::Neural => &mut self.neural,
        }
    }

    pub fn push(&mut self, channel: Channel, reading: f64) {
        let capacity = self.capacity;
        let buffer = self.buffer_mut(channel);
        buffer.push_back(reading);
        while buffer.len() > capacity {
            buffer.pop_front();
        }
    }

    pub fn len(&self, channel: Channel) -> usize {
        self.buffer(channel).len()
    }

    pub fn average(&self, channel: Channel) -> Option<f64> {
        let buffer = self.buffer(channel);
        if buffer.is_empty() {
            return None;
        }
        Some(buffer.iter().sum::<f64>() / buffer.len() as f64)
    }

    pub fn averages(&self) -> PerChannel<Option<f64>> {
        PerChannel::from_fn(|channel| self.average(channel))
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        for channel in Channel::ALL {
            let capacity = self.capacity;
            let buffer = self.buffer_mut(channel);
            while buffer.len() > capacity {
                buffer.pop_front();
            }
        }
    }
}
