//! Minimum-cost bipartite assignment with insert/delete options.
//!
//! Given an n x m cost matrix plus a delete sentinel per row and an
//! insert sentinel per column, [`solve`] returns the assignment that
//! minimizes total cost: every row maps to a column with finite cost or
//! to delete, every column maps to a row or to insert, nothing is
//! assigned twice.
//!
//! Small shapes are solved directly; the general case runs an iterative
//! negative-cost-cycle-canceling search over an auxiliary graph of
//! {start, rows, columns, delete, end} nodes. Each iteration rebuilds
//! the residual cost graph from the tentative matching, relaxes all
//! pairs while recording predecessors, and applies the first negative
//! self-distance cycle found. Every augmentation strictly lowers the
//! total cost and the number of distinct matchings is finite, so the
//! loop terminates at the optimum.
//!
//! The relaxation is O(k^3) per augmentation and restarts from scratch
//! each time; acceptable for sibling-group fan-out, a known hazard for
//! very wide groups.

/// Cost marking an unmatchable pairing.
pub const INFINITE_COST: u32 = 1 << 20;

const INF: i64 = INFINITE_COST as i64;

/// Pairwise cost matrix with delete/insert sentinels.
///
/// Laid out as (rows + 1) x (cols + 1): cell `(i, cols)` holds row i's
/// delete cost, cell `(rows, j)` holds column j's insert cost. All
/// cells start at [`INFINITE_COST`].
#[derive(Debug, Clone)]
pub struct CostMatrix {
    rows: usize,
    cols: usize,
    cells: Vec<u32>,
}

impl CostMatrix {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![INFINITE_COST; (rows + 1) * (cols + 1)],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn set(&mut self, row: usize, col: usize, cost: u32) {
        self.cells[row * (self.cols + 1) + col] = cost;
    }

    pub fn get(&self, row: usize, col: usize) -> u32 {
        self.cells[row * (self.cols + 1) + col]
    }

    /// Cost of leaving `row` unmatched.
    pub fn set_delete_cost(&mut self, row: usize, cost: u32) {
        self.set(row, self.cols, cost);
    }

    pub fn delete_cost(&self, row: usize) -> u32 {
        self.get(row, self.cols)
    }

    /// Cost of leaving `col` unmatched.
    pub fn set_insert_cost(&mut self, col: usize, cost: u32) {
        self.set(self.rows, col, cost);
    }

    pub fn insert_cost(&self, col: usize) -> u32 {
        self.get(self.rows, col)
    }

    /// Matrix with rows and columns (and their sentinels) swapped.
    fn transposed(&self) -> Self {
        let mut t = Self::new(self.cols, self.rows);
        for i in 0..=self.rows {
            for j in 0..=self.cols {
                t.set(j, i, self.get(i, j));
            }
        }
        t
    }
}

/// Solved assignment.
#[derive(Debug, Clone)]
pub struct Assignment {
    /// Per row: matched column, or `None` for delete.
    pub row_to_col: Vec<Option<usize>>,
    /// Per column: matched row, or `None` for insert.
    pub col_to_row: Vec<Option<usize>>,
    /// Total cost of the assignment, clamped to [`INFINITE_COST`].
    pub total_cost: u32,
}

impl Assignment {
    fn from_rows(matrix: &CostMatrix, row_to_col: Vec<Option<usize>>) -> Self {
        let mut col_to_row = vec![None; matrix.cols()];
        // Charge every column as inserted, then credit matched ones.
        let mut total: i64 = (0..matrix.cols())
            .map(|j| matrix.insert_cost(j) as i64)
            .sum();
        for (i, assigned) in row_to_col.iter().enumerate() {
            match assigned {
                None => total += matrix.delete_cost(i) as i64,
                Some(j) => {
                    col_to_row[*j] = Some(i);
                    total += matrix.get(i, *j) as i64 - matrix.insert_cost(*j) as i64;
                }
            }
        }
        Self {
            row_to_col,
            col_to_row,
            total_cost: total.clamp(0, INF) as u32,
        }
    }

    fn transposed(self) -> Self {
        Self {
            row_to_col: self.col_to_row,
            col_to_row: self.row_to_col,
            total_cost: self.total_cost,
        }
    }
}

/// Solve the assignment problem for `matrix`.
pub fn solve(matrix: &CostMatrix) -> Assignment {
    if matrix.rows() < matrix.cols() {
        return solve(&matrix.transposed()).transposed();
    }
    match (matrix.rows(), matrix.cols()) {
        (_, 1) => solve_single_column(matrix),
        (2, 2) => solve_two_by_two(matrix),
        _ => NegativeCycleCanceler::new(matrix).run(),
    }
}

/// One column: matching row i instead of deleting it and inserting the
/// column changes the total by `cell(i) - delete(i) - insert`, so the
/// best row minimizes `cell - delete` and only matches when that gain
/// undercuts the insert cost.
fn solve_single_column(matrix: &CostMatrix) -> Assignment {
    let mut best_row = None;
    let mut best_gain = 0i64;
    for i in 0..matrix.rows() {
        let cell = matrix.get(i, 0);
        if cell >= INFINITE_COST {
            continue;
        }
        let gain = cell as i64 - matrix.delete_cost(i) as i64;
        if best_row.is_none() || gain < best_gain {
            best_gain = gain;
            best_row = Some(i);
        }
    }
    let mut row_to_col = vec![None; matrix.rows()];
    if let Some(i) = best_row {
        if best_gain < matrix.insert_cost(0) as i64 {
            row_to_col[i] = Some(0);
        }
    }
    Assignment::from_rows(matrix, row_to_col)
}

/// 2x2: enumerate every assignment shape, including the partial and
/// empty ones falling back to the delete/insert sentinels.
fn solve_two_by_two(matrix: &CostMatrix) -> Assignment {
    let mut best = Assignment::from_rows(matrix, vec![None, None]);
    let candidates: [[Option<usize>; 2]; 6] = [
        [Some(0), None],
        [Some(1), None],
        [None, Some(0)],
        [None, Some(1)],
        [Some(0), Some(1)],
        [Some(1), Some(0)],
    ];
    for rows in candidates {
        let usable = rows
            .iter()
            .enumerate()
            .all(|(i, c)| c.map_or(true, |j| matrix.get(i, j) < INFINITE_COST));
        if usable {
            let assignment = Assignment::from_rows(matrix, rows.to_vec());
            if assignment.total_cost < best.total_cost {
                best = assignment;
            }
        }
    }
    best
}

/// Negative-cost-cycle-canceling over the auxiliary graph.
///
/// Graph node indexing: 0 = start, 1..=n1 = rows, n1+1..=n1+n2 =
/// columns, then the delete sink and the end node.
struct NegativeCycleCanceler<'a> {
    matrix: &'a CostMatrix,
    node_count: usize,
    /// Dense edge costs, `INF` meaning no edge.
    graph: Vec<i64>,
    /// Predecessor matrix for cycle reconstruction.
    path: Vec<usize>,
    /// Tentative matching, per row.
    matching: Vec<Option<usize>>,
}

impl<'a> NegativeCycleCanceler<'a> {
    fn new(matrix: &'a CostMatrix) -> Self {
        debug_assert!(matrix.rows() >= matrix.cols());
        let node_count = matrix.rows() + matrix.cols() + 3;
        // Initial guess: pair the first columns-worth of rows in order,
        // delete the rest.
        let matching = (0..matrix.rows())
            .map(|i| (i < matrix.cols()).then_some(i))
            .collect();
        Self {
            matrix,
            node_count,
            graph: vec![INF; node_count * node_count],
            path: vec![0; node_count * node_count],
            matching,
        }
    }

    fn run(mut self) -> Assignment {
        loop {
            self.build_cost_graph();
            match self.search_negative_circuit() {
                Some(circuit) => self.apply_circuit(&circuit),
                None => break,
            }
        }
        Assignment::from_rows(self.matrix, self.matching)
    }

    fn col_node(&self, j: usize) -> usize {
        self.matrix.rows() + 1 + j
    }

    fn delete_node(&self) -> usize {
        self.node_count - 2
    }

    fn end_node(&self) -> usize {
        self.node_count - 1
    }

    fn edge(&mut self, from: usize, to: usize) -> &mut i64 {
        &mut self.graph[from * self.node_count + to]
    }

    /// Rebuild the residual cost graph from the current matching.
    ///
    /// An assigned pair carries a negative undo edge (column -> row)
    /// equal to its match cost; an unassigned pair carries its forward
    /// cost. Delete and insert options are wired through the delete
    /// sink and the end node the same way.
    fn build_cost_graph(&mut self) {
        let (n1, n2) = (self.matrix.rows(), self.matrix.cols());
        let (delete, end) = (self.delete_node(), self.end_node());

        self.graph.fill(INF);
        for v in 0..self.node_count {
            *self.edge(v, v) = 0;
        }
        // Rows can always give their slot back to start.
        for i in 0..n1 {
            *self.edge(i + 1, 0) = 0;
        }
        // Unmatched columns flow to end for free (matched ones are
        // overridden below).
        for j in 0..n2 {
            *self.edge(self.col_node(j), end) = 0;
        }

        let mut delete_count = 0;
        for i in 0..n1 {
            let row = i + 1;
            for j in 0..n2 {
                *self.edge(row, self.col_node(j)) = self.matrix.get(i, j) as i64;
            }
            match self.matching[i] {
                None => {
                    delete_count += 1;
                    // Undoing this delete refunds its cost.
                    *self.edge(delete, row) = -(self.matrix.delete_cost(i) as i64);
                }
                Some(j) => {
                    let col = self.col_node(j);
                    // Undo edge for the pair; the forward edge closes.
                    *self.edge(row, col) = INF;
                    *self.edge(col, row) = -(self.matrix.get(i, j) as i64);
                    // This row could switch to delete instead.
                    *self.edge(row, delete) = self.matrix.delete_cost(i) as i64;
                    // The matched column could fall back to insert.
                    *self.edge(col, end) = INF;
                    *self.edge(end, col) = self.matrix.insert_cost(j) as i64;
                }
            }
        }

        // Delete capacity: passable in whichever directions still have
        // headroom.
        if delete_count < n1 {
            *self.edge(delete, end) = 0;
        }
        if delete_count > 0 {
            *self.edge(end, delete) = 0;
        }
    }

    /// All-pairs relaxation; stops at the first negative self-distance
    /// and reconstructs the corresponding circuit.
    fn search_negative_circuit(&mut self) -> Option<Vec<usize>> {
        let count = self.node_count;
        for (i, slot) in self.path.iter_mut().enumerate() {
            *slot = i / count;
        }
        for k in 0..count {
            for i in 0..count {
                let ik = self.graph[i * count + k];
                if i == k || ik == INF {
                    continue;
                }
                for j in 0..count {
                    let kj = self.graph[k * count + j];
                    if j == k || kj == INF {
                        continue;
                    }
                    let less = ik + kj;
                    if less < self.graph[i * count + j] {
                        self.graph[i * count + j] = less;
                        self.path[i * count + j] = k;
                        if i == j && less < 0 {
                            let mut circuit = vec![i];
                            self.expand_path(i, i, &mut circuit);
                            return Some(circuit);
                        }
                    }
                }
            }
        }
        None
    }

    /// Append the nodes of the relaxed shortest path from `from` to
    /// `to` (excluding `from`, including `to`).
    fn expand_path(&self, from: usize, to: usize, out: &mut Vec<usize>) {
        let mid = self.path[from * self.node_count + to];
        if mid == from {
            out.push(to);
        } else {
            self.expand_path(from, mid, out);
            self.expand_path(mid, to, out);
        }
    }

    /// Flip every row -> column/delete edge along the circuit into the
    /// matching; one augmentation.
    fn apply_circuit(&mut self, circuit: &[usize]) {
        let (n1, n2) = (self.matrix.rows(), self.matrix.cols());
        let delete = self.delete_node();
        for pair in circuit.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            if (1..=n1).contains(&from) {
                let row = from - 1;
                if to == delete {
                    self.matching[row] = None;
                } else if (n1 + 1..=n1 + n2).contains(&to) {
                    self.matching[row] = Some(to - n1 - 1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn matrix(rows: usize, cols: usize, cells: &[u32], del: &[u32], ins: &[u32]) -> CostMatrix {
        let mut m = CostMatrix::new(rows, cols);
        for i in 0..rows {
            for j in 0..cols {
                m.set(i, j, cells[i * cols + j]);
            }
            m.set_delete_cost(i, del[i]);
        }
        for (j, &cost) in ins.iter().enumerate() {
            m.set_insert_cost(j, cost);
        }
        m
    }

    /// Exhaustive minimum over all valid assignments.
    fn brute_force(m: &CostMatrix) -> u32 {
        fn recurse(m: &CostMatrix, row: usize, used: &mut [bool], acc: i64, best: &mut i64) {
            if acc >= *best {
                return;
            }
            if row == m.rows() {
                let mut total = acc;
                for (j, &u) in used.iter().enumerate() {
                    if !u {
                        total += m.insert_cost(j) as i64;
                    }
                }
                *best = (*best).min(total);
                return;
            }
            recurse(m, row + 1, used, acc + m.delete_cost(row) as i64, best);
            for j in 0..m.cols() {
                if !used[j] && m.get(row, j) < INFINITE_COST {
                    used[j] = true;
                    recurse(m, row + 1, used, acc + m.get(row, j) as i64, best);
                    used[j] = false;
                }
            }
        }
        let mut best = i64::MAX;
        let mut used = vec![false; m.cols()];
        recurse(m, 0, &mut used, 0, &mut best);
        best.clamp(0, INF) as u32
    }

    fn assert_valid(m: &CostMatrix, a: &Assignment) {
        for (i, assigned) in a.row_to_col.iter().enumerate() {
            if let Some(j) = assigned {
                assert_eq!(a.col_to_row[*j], Some(i), "inconsistent pair ({i}, {j})");
            }
        }
        for (j, assigned) in a.col_to_row.iter().enumerate() {
            if let Some(i) = assigned {
                assert_eq!(a.row_to_col[*i], Some(j), "inconsistent pair ({i}, {j})");
            }
        }
    }

    #[test]
    fn test_single_pair() {
        let m = matrix(1, 1, &[3], &[5], &[5]);
        let a = solve(&m);
        assert_eq!(a.row_to_col, vec![Some(0)]);
        assert_eq!(a.total_cost, 3);
    }

    #[test]
    fn test_single_pair_unmatchable() {
        let m = matrix(1, 1, &[INFINITE_COST], &[2], &[4]);
        let a = solve(&m);
        assert_eq!(a.row_to_col, vec![None]);
        assert_eq!(a.col_to_row, vec![None]);
        assert_eq!(a.total_cost, 6);
    }

    #[test]
    fn test_column_scan_prefers_cheapest_row() {
        let m = matrix(3, 1, &[9, 2, 7], &[1, 1, 1], &[10]);
        let a = solve(&m);
        assert_eq!(a.row_to_col, vec![None, Some(0), None]);
        assert_eq!(a.total_cost, 2 + 1 + 1);
    }

    #[test]
    fn test_single_pair_delete_beats_costly_match() {
        // Matching at 10 loses to deleting the row and inserting the
        // column for 2.
        let m = matrix(1, 1, &[10], &[1], &[1]);
        let a = solve(&m);
        assert_eq!(a.row_to_col, vec![None]);
        assert_eq!(a.col_to_row, vec![None]);
        assert_eq!(a.total_cost, 2);
    }

    #[test]
    fn test_column_scan_weighs_delete_costs() {
        // Row 0 has the cheaper cell but row 1 frees the expensive
        // delete, so matching row 1 wins overall.
        let m = matrix(2, 1, &[5, 6], &[1, 9], &[10]);
        let a = solve(&m);
        assert_eq!(a.row_to_col, vec![None, Some(0)]);
        assert_eq!(a.total_cost, 6 + 1);
    }

    #[test]
    fn test_two_by_two_sentinels_beat_expensive_diagonal() {
        let m = matrix(
            2,
            2,
            &[10, INFINITE_COST, INFINITE_COST, 10],
            &[1, 1],
            &[1, 1],
        );
        let a = solve(&m);
        assert_eq!(a.row_to_col, vec![None, None]);
        assert_eq!(a.total_cost, 4);
    }

    #[test]
    fn test_two_by_two_partial_match() {
        // Pairing (0, 0) and writing the rest off beats both full
        // pairings and the empty assignment.
        let m = matrix(2, 2, &[1, 40, 40, 40], &[2, 2], &[2, 2]);
        let a = solve(&m);
        assert_eq!(a.row_to_col, vec![Some(0), None]);
        assert_eq!(a.col_to_row, vec![Some(0), None]);
        assert_eq!(a.total_cost, 1 + 2 + 2);
    }

    #[test]
    fn test_two_by_two_crossed() {
        let m = matrix(2, 2, &[10, 1, 1, 10], &[5, 5], &[5, 5]);
        let a = solve(&m);
        assert_eq!(a.row_to_col, vec![Some(1), Some(0)]);
        assert_eq!(a.total_cost, 2);
    }

    #[test]
    fn test_delete_beats_expensive_match() {
        // Matching costs more than deleting row 2 and inserting col 2.
        let m = matrix(
            3,
            3,
            &[0, 50, 50, 50, 0, 50, 50, 50, 40],
            &[3, 3, 3],
            &[4, 4, 4],
        );
        let a = solve(&m);
        assert_eq!(a.row_to_col, vec![Some(0), Some(1), None]);
        assert_eq!(a.col_to_row, vec![Some(0), Some(1), None]);
        assert_eq!(a.total_cost, 3 + 4);
    }

    #[test]
    fn test_wide_matrix_transposes() {
        let m = matrix(1, 3, &[8, 2, 9], &[1], &[3, 3, 3]);
        let a = solve(&m);
        assert_eq!(a.row_to_col, vec![Some(1)]);
        assert_eq!(a.col_to_row, vec![None, Some(0), None]);
        assert_eq!(a.total_cost, 2 + 3 + 3);
    }

    #[test]
    fn test_infinite_initial_guess_is_repaired() {
        // The identity guess pairs (0,0) and (1,1), both unmatchable;
        // the canceler must route around them.
        let m = matrix(
            3,
            3,
            &[
                INFINITE_COST,
                2,
                9,
                3,
                INFINITE_COST,
                9,
                9,
                9,
                0,
            ],
            &[9, 9, 9],
            &[9, 9, 9],
        );
        let a = solve(&m);
        assert_eq!(a.row_to_col, vec![Some(1), Some(0), Some(2)]);
        assert_eq!(a.total_cost, 5);
    }

    fn cost_cell() -> impl Strategy<Value = u32> {
        prop_oneof![4 => 0u32..20, 1 => Just(INFINITE_COST)]
    }

    proptest! {
        #[test]
        fn prop_matches_brute_force(
            rows in 1usize..=6,
            cols in 1usize..=6,
            cells in prop::collection::vec(cost_cell(), 36),
            del in prop::collection::vec(1u32..10, 6),
            ins in prop::collection::vec(1u32..10, 6),
        ) {
            let mut m = CostMatrix::new(rows, cols);
            for i in 0..rows {
                for j in 0..cols {
                    m.set(i, j, cells[i * 6 + j]);
                }
                m.set_delete_cost(i, del[i]);
            }
            for j in 0..cols {
                m.set_insert_cost(j, ins[j]);
            }
            let a = solve(&m);
            assert_valid(&m, &a);
            prop_assert_eq!(a.total_cost, brute_force(&m));
        }
    }
}
