//! Myers' O(ND) shortest edit script
//!
//! Edits refer to positions in the two input sequences rather than to copies
//! of their values; the three-way merge only needs to know which lines match.

use derive_new::new;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    Delete { a_index: usize },
    Insert { b_index: usize },
    Equal { a_index: usize, b_index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct MyersDiff<'d, T> {
    a: &'d [T],
    b: &'d [T],
}

impl<T: Eq> MyersDiff<'_, T> {
    fn compute_shortest_edit(&self) -> Vec<Vec<isize>> {
        let (n, m) = (self.a.len() as isize, self.b.len() as isize);
        let offset = (n + m) as usize;

        // one spare slot so that `k + 1` stays in bounds when both inputs are empty
        let mut v = vec![0; 2 * offset + 2];
        let mut trace = Vec::new();

        for d in 0..=(n + m) {
            trace.push(v.clone());

            for k in (-d..=d).step_by(2) {
                let idx = (offset as isize + k) as usize;

                let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                    // came from k+1, an insertion
                    v[idx + 1]
                } else {
                    // came from k-1, a deletion
                    v[idx - 1] + 1
                };

                let mut y = x - k;
                while x < n && y < m && self.a[x as usize] == self.b[y as usize] {
                    x += 1;
                    y += 1;
                }

                v[idx] = x;

                if x >= n && y >= m {
                    return trace;
                }
            }
        }

        trace
    }

    fn backtrack(&self) -> Vec<(isize, isize, isize, isize)> {
        let (mut x, mut y) = (self.a.len() as isize, self.b.len() as isize);
        let offset = (x + y) as isize;
        let mut edit_path = Vec::new();

        for (d, v) in self.compute_shortest_edit().iter().enumerate().rev() {
            let d = d as isize;
            let k = x - y;

            let prev_k = if k == -d
                || (k != d && v[(offset + k - 1) as usize] < v[(offset + k + 1) as usize])
            {
                k + 1
            } else {
                k - 1
            };

            let prev_x = v[(offset + prev_k) as usize];
            let prev_y = prev_x - prev_k;

            while x > prev_x && y > prev_y {
                edit_path.push((x - 1, y - 1, x, y));
                x -= 1;
                y -= 1;
            }

            if d > 0 {
                edit_path.push((prev_x, prev_y, x, y));
            }

            (x, y) = (prev_x, prev_y);
        }

        edit_path
    }

    /// Edit script turning `a` into `b`, in order
    pub fn diff(&self) -> Vec<Edit> {
        let mut diff = self
            .backtrack()
            .into_iter()
            .map(|(prev_x, prev_y, x, y)| {
                if x == prev_x {
                    Edit::Insert {
                        b_index: prev_y as usize,
                    }
                } else if y == prev_y {
                    Edit::Delete {
                        a_index: prev_x as usize,
                    }
                } else {
                    Edit::Equal {
                        a_index: prev_x as usize,
                        b_index: prev_y as usize,
                    }
                }
            })
            .collect::<Vec<_>>();

        diff.reverse();
        diff
    }

    /// Pairs of positions holding equal values, in increasing order
    pub fn matches(&self) -> Vec<(usize, usize)> {
        self.diff()
            .into_iter()
            .filter_map(|edit| match edit {
                Edit::Equal { a_index, b_index } => Some((a_index, b_index)),
                _ => None,
            })
            .collect()
    }
}
