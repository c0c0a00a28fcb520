//! Consumers of configuration updates.

/// Receives every configuration value the manager applies.
///
/// Each call gets its own clone of the value. Calls for different listeners
/// run concurrently and in no particular order, so implementations must not
/// assume they observe updates in lockstep with other listeners.
pub trait Listener<T>: Send + Sync {
    fn update(&self, config: T);
}

impl<T, F> Listener<T> for F
where
    F: Fn(T) + Send + Sync,
{
    fn update(&self, config: T) {
        self(config)
    }
}
