//! Bundles the three pieces of mutable state the Event Loop dispatches to,
//! so `main` can own one value instead of threading three through the loop.

use crate::aggregator::Aggregator;
use crate::symbolizer::Symbolizer;
use crate::tracker::ThreadTracker;

pub struct ProfilerContext {
    pub tracker: ThreadTracker,
    pub symbolizer: Symbolizer,
    pub aggregator: Aggregator,
}

impl ProfilerContext {
    pub fn new(sample_period: u64) -> Self {
        ProfilerContext {
            tracker: ThreadTracker::new(sample_period),
            symbolizer: Symbolizer::new(),
            aggregator: Aggregator::new(sample_period),
        }
    }
}
