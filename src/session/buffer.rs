//! Sampler Buffer
//!
//! Fixed-capacity rolling windows of telemetry points, one per metric channel.
//! Points are kept in arrival order: late or out-of-order samples from the
//! engine are appended, never merged by `elapsed_sec`.

use crate::models::Sample;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default window length per channel (matches the live charts).
pub const DEFAULT_CAPACITY: usize = 50;

/// Metric channels fed by each engine sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricChannel {
    Utilization,
    Temperature,
    Memory,
    Power,
}

impl MetricChannel {
    pub const ALL: [MetricChannel; 4] = [
        MetricChannel::Utilization,
        MetricChannel::Temperature,
        MetricChannel::Memory,
        MetricChannel::Power,
    ];

    fn index(self) -> usize {
        match self {
            MetricChannel::Utilization => 0,
            MetricChannel::Temperature => 1,
            MetricChannel::Memory => 2,
            MetricChannel::Power => 3,
        }
    }

    /// Value of this channel in an engine sample.
    pub fn value_of(self, sample: &Sample) -> f64 {
        match self {
            MetricChannel::Utilization => sample.utilization_pct,
            MetricChannel::Temperature => sample.temperature_c,
            MetricChannel::Memory => sample.memory_used_mb,
            MetricChannel::Power => sample.power_w,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MetricChannel::Utilization => "utilization %",
            MetricChannel::Temperature => "temperature C",
            MetricChannel::Memory => "memory MB",
            MetricChannel::Power => "power W",
        }
    }
}

/// One time-stamped value in a channel window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelPoint {
    pub elapsed_sec: f64,
    pub value: f64,
}

/// Capped FIFO windows for every metric channel.
#[derive(Debug, Clone)]
pub struct SamplerBuffer {
    channels: [VecDeque<ChannelPoint>; 4],
    capacity: usize,
}

impl SamplerBuffer {
    /// Create an empty buffer. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        SamplerBuffer {
            channels: std::array::from_fn(|_| VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a point, evicting the oldest once the window is full.
    pub fn push(&mut self, channel: MetricChannel, point: ChannelPoint) {
        let window = &mut self.channels[channel.index()];
        if window.len() == self.capacity {
            window.pop_front();
        }
        window.push_back(point);
    }

    /// Fan an engine sample out to every channel.
    pub fn ingest(&mut self, sample: &Sample) {
        for channel in MetricChannel::ALL {
            self.push(
                channel,
                ChannelPoint {
                    elapsed_sec: sample.elapsed_sec,
                    value: channel.value_of(sample),
                },
            );
        }
    }

    /// Owned copy of a channel window, oldest first.
    pub fn snapshot(&self, channel: MetricChannel) -> Vec<ChannelPoint> {
        self.channels[channel.index()].iter().copied().collect()
    }

    /// Most recent point of a channel.
    pub fn latest(&self, channel: MetricChannel) -> Option<ChannelPoint> {
        self.channels[channel.index()].back().copied()
    }

    pub fn len(&self, channel: MetricChannel) -> usize {
        self.channels[channel.index()].len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.iter().all(VecDeque::is_empty)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        for window in self.channels.iter_mut() {
            window.clear();
        }
    }
}

impl Default for SamplerBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
