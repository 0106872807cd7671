//! Progress notifications for a caller-visible indicator.
//!
//! A run reports an integer percentage with a short status phrase at fixed
//! milestones, then once per aggregated variable.

/// Observer of run progress.
pub trait Progress {
    fn report(&mut self, percent: u8, status: &str);
}

impl<F: FnMut(u8, &str)> Progress for F {
    fn report(&mut self, percent: u8, status: &str) {
        self(percent, status)
    }
}

/// Discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn report(&mut self, _percent: u8, _status: &str) {}
}

pub const LOAD_START: u8 = 0;
pub const LOADING: u8 = 10;
pub const LOAD_COMPLETE: u8 = 50;
pub const BOUNDARY_CHECKED: u8 = 55;
pub const DONE: u8 = 100;

/// Percentage after the `index`-th of `count` variables; the last one reaches [`DONE`].
pub fn variable_milestone(index: usize, count: usize) -> u8 {
    if count == 0 { return DONE }
    let span = (DONE - BOUNDARY_CHECKED) as usize;
    BOUNDARY_CHECKED + (span * (index + 1).min(count) / count) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn milestones_climb_to_done() {
        let steps = (0..4).map(|i| variable_milestone(i, 4)).collect::<Vec<_>>();
        assert_eq!(steps, [66, 77, 88, 100]);
        assert_eq!(variable_milestone(0, 0), DONE);
    }

    #[test]
    fn closures_are_observers() {
        let mut seen = Vec::new();
        let mut observer = |percent: u8, status: &str| seen.push((percent, status.to_string()));
        observer.report(LOAD_COMPLETE, "Grid loaded");
        assert_eq!(seen, [(50, "Grid loaded".to_string())]);
    }
}
