//! Streaming sliding-window min/max filter.
//!
//! Monotonic-deque algorithm from Lemire, "Streaming Maximum-Minimum Filter
//! Using No More than 3 Comparisons per Element". Edges are clamped so the
//! filtered output has the same length as the input; the window size must be
//! odd for the output to stay centered.

use std::collections::VecDeque;

pub struct MinMaxFilter {
    window_size: usize,
    padded: Vec<f32>,
    max_val: Vec<f32>,
    min_val: Vec<f32>,
    max_fifo: VecDeque<usize>,
    min_fifo: VecDeque<usize>,
}

impl MinMaxFilter {
    /// Create a filter for repeated use on slices of length `data_len`.
    ///
    /// Panics if `window_size` is even.
    pub fn new(window_size: usize, data_len: usize) -> Self {
        assert!(
            window_size % 2 == 1,
            "window size must be odd when clamping edges"
        );
        Self {
            window_size,
            padded: vec![0.0; data_len + window_size - 1],
            max_val: vec![0.0; data_len],
            min_val: vec![0.0; data_len],
            max_fifo: VecDeque::with_capacity(window_size),
            min_fifo: VecDeque::with_capacity(window_size),
        }
    }

    /// Run the filter over `data`; results are available from [`Self::max`]
    /// and [`Self::min`] until the next call.
    pub fn filter(&mut self, data: &[f32]) {
        assert_eq!(
            data.len() + self.window_size - 1,
            self.padded.len(),
            "data length mismatch"
        );
        let ws = self.window_size;
        let half = ws / 2;

        // Clamp edges by extending with the boundary values.
        self.padded[half..half + data.len()].copy_from_slice(data);
        self.padded[..half].fill(data[0]);
        let tail = self.padded.len() - half;
        self.padded[tail..].fill(data[data.len() - 1]);

        let a = &self.padded;
        self.max_fifo.clear();
        self.min_fifo.clear();
        self.max_fifo.push_back(0);
        self.min_fifo.push_back(0);

        for i in 1..ws {
            if a[i] > a[i - 1] {
                self.max_fifo.pop_back();
                while let Some(&j) = self.max_fifo.back() {
                    if a[i] <= a[j] {
                        break;
                    }
                    self.max_fifo.pop_back();
                }
            } else {
                self.min_fifo.pop_back();
                while let Some(&j) = self.min_fifo.back() {
                    if a[i] >= a[j] {
                        break;
                    }
                    self.min_fifo.pop_back();
                }
            }
            self.max_fifo.push_back(i);
            self.min_fifo.push_back(i);
        }

        for i in ws..a.len() {
            self.max_val[i - ws] = a[*self.max_fifo.front().unwrap()];
            self.min_val[i - ws] = a[*self.min_fifo.front().unwrap()];

            if a[i] > a[i - 1] {
                self.max_fifo.pop_back();
                while let Some(&j) = self.max_fifo.back() {
                    if a[i] <= a[j] {
                        break;
                    }
                    self.max_fifo.pop_back();
                }
            } else {
                self.min_fifo.pop_back();
                while let Some(&j) = self.min_fifo.back() {
                    if a[i] >= a[j] {
                        break;
                    }
                    self.min_fifo.pop_back();
                }
            }
            self.max_fifo.push_back(i);
            self.min_fifo.push_back(i);

            if i == ws + *self.max_fifo.front().unwrap() {
                self.max_fifo.pop_front();
            } else if i == ws + *self.min_fifo.front().unwrap() {
                self.min_fifo.pop_front();
            }
        }
        let last = a.len() - ws;
        self.max_val[last] = a[*self.max_fifo.front().unwrap()];
        self.min_val[last] = a[*self.min_fifo.front().unwrap()];
    }

    pub fn max(&self) -> &[f32] {
        &self.max_val
    }

    pub fn min(&self) -> &[f32] {
        &self.min_val
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_window_max(data: &[f32], half: usize, i: usize) -> f32 {
        let start = i.saturating_sub(half);
        let stop = (i + half).min(data.len() - 1);
        data[start..=stop].iter().cloned().fold(f32::MIN, f32::max)
    }

    fn naive_window_min(data: &[f32], half: usize, i: usize) -> f32 {
        let start = i.saturating_sub(half);
        let stop = (i + half).min(data.len() - 1);
        data[start..=stop].iter().cloned().fold(f32::MAX, f32::min)
    }

    #[test]
    fn test_matches_naive_filter() {
        let data: Vec<f32> = vec![1.0, 2.0, 3.0, 7.0, 8.0, -7.0, 12.0, 13.0, 7.0];
        let mut filter = MinMaxFilter::new(3, data.len());
        filter.filter(&data);

        for i in 0..data.len() {
            assert_eq!(filter.max()[i], naive_window_max(&data, 1, i), "max at {i}");
            assert_eq!(filter.min()[i], naive_window_min(&data, 1, i), "min at {i}");
        }
    }

    #[test]
    fn test_larger_window_pseudorandom_data() {
        let data: Vec<f32> = (0..257u64)
            .map(|i| (((i * 1103515245 + 12345) % 1000) as f32) / 1000.0)
            .collect();
        let mut filter = MinMaxFilter::new(15, data.len());
        filter.filter(&data);

        for i in 0..data.len() {
            assert_eq!(filter.max()[i], naive_window_max(&data, 7, i), "max at {i}");
            assert_eq!(filter.min()[i], naive_window_min(&data, 7, i), "min at {i}");
        }
    }

    #[test]
    fn test_reuse_between_calls() {
        let a = vec![1.0f32; 32];
        let b: Vec<f32> = (0..32).map(|i| i as f32).collect();
        let mut filter = MinMaxFilter::new(5, 32);
        filter.filter(&a);
        filter.filter(&b);
        assert_eq!(filter.max()[31], 31.0);
        assert_eq!(filter.min()[0], 0.0);
    }
}
