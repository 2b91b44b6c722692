//! Race track geometry: parsing, validation and the distance field.
//!
//! A track is a rectangular grid of [`Cell`]s read from text, one row per
//! line. The distance field holds the number of breadth-first hops from
//! every reachable cell to the nearest finish cell. Walls receive a distance
//! when they border a reachable cell but never pass it on.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SetupError;
use crate::point::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cell {
    Open,
    Wall,
    Start,
    Finish,
}

impl Cell {
    pub const fn from_char(ch: char) -> Option<Self> {
        match ch {
            ' ' => Some(Self::Open),
            'o' => Some(Self::Wall),
            's' => Some(Self::Start),
            'f' => Some(Self::Finish),
            _ => None,
        }
    }

    pub const fn as_char(self) -> char {
        match self {
            Self::Open => ' ',
            Self::Wall => 'o',
            Self::Start => 's',
            Self::Finish => 'f',
        }
    }
}

/// A validated track with its precomputed distance field.
///
/// Immutable after construction. Drivers get their own clone, the scheduler
/// shares its copy read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMap {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
    start_points: Vec<Point>,
    finish_points: Vec<Point>,
    distances: Vec<Option<u32>>,
    max_distance: u32,
}

impl TrackMap {
    /// Reads and parses a track file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SetupError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SetupError::MapUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        text.parse()
    }

    /// Validates the rows and builds the distance field.
    pub fn parse<I, S>(lines: I) -> Result<Self, SetupError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rows: Vec<Vec<char>> = lines
            .into_iter()
            .map(|line| line.as_ref().chars().collect())
            .collect();
        let Some(first) = rows.first() else {
            return Err(SetupError::EmptyMap);
        };
        let width = first.len();
        let height = rows.len();

        let mut cells = Vec::with_capacity(width * height);
        let mut start_points = Vec::new();
        let mut finish_points = Vec::new();

        for (y, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(SetupError::InconsistentRow {
                    line: y + 1,
                    expected: width,
                    found: row.len(),
                    last: y + 1 == height,
                });
            }
            if row.first() != Some(&'o') || row.last() != Some(&'o') {
                return Err(SetupError::BorderNotWall { line: y + 1 });
            }
            for (x, &ch) in row.iter().enumerate() {
                let at = Point::new(x as i32, y as i32);
                let cell = Cell::from_char(ch).ok_or(SetupError::UnknownCharacter { ch, at })?;
                match cell {
                    Cell::Start => start_points.push(at),
                    Cell::Finish => finish_points.push(at),
                    Cell::Open | Cell::Wall => {}
                }
                cells.push(cell);
            }
        }

        for line in [1, height] {
            if rows[line - 1].iter().any(|&ch| ch != 'o') {
                return Err(SetupError::EdgeRowNotWall { line });
            }
        }
        if start_points.is_empty() {
            return Err(SetupError::NoStartPoints);
        }
        if finish_points.is_empty() {
            return Err(SetupError::NoFinishPoints);
        }

        let mut track = Self {
            width,
            height,
            cells,
            start_points,
            finish_points,
            distances: Vec::new(),
            max_distance: 0,
        };
        track.build_distances();

        if let Some(&at) = track
            .start_points
            .iter()
            .find(|&&p| track.distance_at(p).is_none())
        {
            return Err(SetupError::StartUnreachable { at });
        }
        Ok(track)
    }

    // Multi-source BFS from every finish cell. Walls get a distance but are
    // never queued.
    fn build_distances(&mut self) {
        self.distances = vec![None; self.cells.len()];
        let mut queue = VecDeque::new();
        for &p in &self.finish_points {
            if let Some(i) = self.index(p) {
                self.distances[i] = Some(0);
                queue.push_back((p, 0u32));
            }
        }

        while let Some((cell, dist)) = queue.pop_front() {
            for p in Self::neighbors(cell) {
                let Some(i) = self.index(p) else {
                    continue;
                };
                if self.distances[i].is_some() {
                    continue;
                }
                self.distances[i] = Some(dist + 1);
                self.max_distance = dist + 1;
                if self.cells[i] != Cell::Wall {
                    queue.push_back((p, dist + 1));
                }
            }
        }
    }

    /// The 3x3 block centered on `p`, `p` included. Points outside the grid
    /// are not filtered out. Coordinates saturate at the `i32` range.
    pub fn neighbors(p: Point) -> [Point; 9] {
        let mut block = [p; 9];
        let mut k = 0;
        for dx in -1..=1 {
            for dy in -1..=1 {
                block[k] = Point::new(p.x.saturating_add(dx), p.y.saturating_add(dy));
                k += 1;
            }
        }
        block
    }

    fn index(&self, p: Point) -> Option<usize> {
        if p.x < 0 || p.y < 0 {
            return None;
        }
        let (x, y) = (p.x as usize, p.y as usize);
        (x < self.width && y < self.height).then(|| y * self.width + x)
    }

    pub fn contains(&self, p: Point) -> bool {
        self.index(p).is_some()
    }

    pub fn cell_at(&self, p: Point) -> Option<Cell> {
        self.index(p).map(|i| self.cells[i])
    }

    pub fn is_wall(&self, p: Point) -> bool {
        self.cell_at(p) == Some(Cell::Wall)
    }

    /// Hops to the nearest finish, or `None` outside the grid or when the
    /// cell is unreachable.
    pub fn distance_at(&self, p: Point) -> Option<u32> {
        self.index(p).and_then(|i| self.distances[i])
    }

    pub const fn width(&self) -> usize {
        self.width
    }

    pub const fn height(&self) -> usize {
        self.height
    }

    pub const fn max_distance(&self) -> u32 {
        self.max_distance
    }

    pub fn start_points(&self) -> &[Point] {
        &self.start_points
    }

    pub fn finish_points(&self) -> &[Point] {
        &self.finish_points
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (Point, Cell)> + '_ {
        self.cells.iter().enumerate().map(move |(i, &cell)| {
            let p = Point::new((i % self.width) as i32, (i / self.width) as i32);
            (p, cell)
        })
    }
}

impl FromStr for TrackMap {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s.lines())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    const CORRIDOR: &str = "ooooooo\nos   fo\nooooooo\n";

    fn p(x: i32, y: i32) -> Point {
        Point::new(x, y)
    }

    #[test]
    fn parses_cells_and_points() {
        let track: TrackMap = CORRIDOR.parse().unwrap();
        assert_eq!(track.width(), 7);
        assert_eq!(track.height(), 3);
        assert_eq!(track.start_points(), &[p(1, 1)]);
        assert_eq!(track.finish_points(), &[p(5, 1)]);
        assert_eq!(track.cell_at(p(3, 1)), Some(Cell::Open));
        assert_eq!(track.cell_at(p(0, 0)), Some(Cell::Wall));
        assert_eq!(track.cell_at(p(7, 1)), None);
        assert_eq!(track.cell_at(p(-1, 1)), None);
        assert_eq!(track.cells().count(), 21);
    }

    #[test]
    fn corridor_distances() {
        let track: TrackMap = CORRIDOR.parse().unwrap();
        assert_eq!(track.distance_at(p(5, 1)), Some(0));
        assert_eq!(track.distance_at(p(4, 1)), Some(1));
        assert_eq!(track.distance_at(p(2, 1)), Some(3));
        assert_eq!(track.distance_at(p(1, 1)), Some(4));
        // walls bordering the track are sinks
        assert_eq!(track.distance_at(p(6, 1)), Some(1));
        assert_eq!(track.distance_at(p(0, 1)), Some(5));
        assert_eq!(track.max_distance(), 5);
        assert_eq!(track.distance_at(p(9, 9)), None);
    }

    #[test]
    fn walls_do_not_conduct_distance() {
        let err = "ooooo\nosofo\nooooo".parse::<TrackMap>().unwrap_err();
        assert!(matches!(err, SetupError::StartUnreachable { at } if at == p(1, 1)));
    }

    #[test]
    fn neighbors_are_always_nine() {
        for center in [p(0, 0), p(-4, 2), p(100, 100)] {
            let block = TrackMap::neighbors(center);
            assert_eq!(block.len(), 9);
            assert!(block.contains(&center));
            assert!(block.iter().all(|q| (*q - center).chebyshev() <= 1));
        }
        assert_eq!(TrackMap::neighbors(p(0, 0))[0], p(-1, -1));
        assert_eq!(TrackMap::neighbors(p(0, 0))[1], p(-1, 0));
    }

    #[test]
    fn rejects_inconsistent_rows() {
        let err = "ooooo\nos fo\noooo".parse::<TrackMap>().unwrap_err();
        assert!(matches!(
            err,
            SetupError::InconsistentRow {
                line: 3,
                expected: 5,
                found: 4,
                last: true
            }
        ));
    }

    #[test]
    fn rejects_open_borders() {
        let err = "ooooo\n s fo\nooooo".parse::<TrackMap>().unwrap_err();
        assert!(matches!(err, SetupError::BorderNotWall { line: 2 }));

        let err = "oo oo\nos fo\nooooo".parse::<TrackMap>().unwrap_err();
        assert!(matches!(err, SetupError::EdgeRowNotWall { line: 1 }));

        let err = "ooooo\nos fo\noo oo".parse::<TrackMap>().unwrap_err();
        assert!(matches!(err, SetupError::EdgeRowNotWall { line: 3 }));
    }

    #[test]
    fn rejects_unknown_characters() {
        let err = "ooooo\nosxfo\nooooo".parse::<TrackMap>().unwrap_err();
        assert!(matches!(err, SetupError::UnknownCharacter { ch: 'x', at } if at == p(2, 1)));
    }

    #[test]
    fn rejects_missing_start_or_finish() {
        assert!(matches!(
            "ooooo\no  fo\nooooo".parse::<TrackMap>(),
            Err(SetupError::NoStartPoints)
        ));
        assert!(matches!(
            "ooooo\nos  o\nooooo".parse::<TrackMap>(),
            Err(SetupError::NoFinishPoints)
        ));
        assert!(matches!("".parse::<TrackMap>(), Err(SetupError::EmptyMap)));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = TrackMap::from_file("does/not/exist.txt").unwrap_err();
        assert!(matches!(err, SetupError::MapUnreadable { .. }));
    }

    #[test]
    fn accepts_crlf_line_endings() {
        let track: TrackMap = "ooooo\r\nos fo\r\nooooo\r\n".parse().unwrap();
        assert_eq!(track.width(), 5);
        assert_eq!(track.distance_at(p(1, 1)), Some(2));
    }

    #[test]
    fn neighbors_saturate_at_the_coordinate_range() {
        let block = TrackMap::neighbors(p(i32::MAX, i32::MIN));
        assert_eq!(block.len(), 9);
        assert!(block.contains(&p(i32::MAX, i32::MIN)));
        assert!(block.contains(&p(i32::MAX - 1, i32::MIN + 1)));
    }

    #[test]
    fn loading_twice_is_identical() {
        let a: TrackMap = CORRIDOR.parse().unwrap();
        let b: TrackMap = CORRIDOR.parse().unwrap();
        assert_eq!(a, b);
    }

    // ── Reference distance field ─────────────────────────────────

    // Relaxes distances until nothing changes. Only non-wall cells pass
    // their distance on.
    fn reference_distances(track: &TrackMap) -> HashMap<Point, u32> {
        let mut dist: HashMap<Point, u32> =
            track.finish_points().iter().map(|&f| (f, 0)).collect();
        let mut changed = true;
        while changed {
            changed = false;
            for (cell_p, cell) in track.cells() {
                let Some(&d) = dist.get(&cell_p) else {
                    continue;
                };
                if cell == Cell::Wall {
                    continue;
                }
                for n in TrackMap::neighbors(cell_p) {
                    if !track.contains(n) {
                        continue;
                    }
                    if dist.get(&n).map_or(true, |&old| old > d + 1) {
                        dist.insert(n, d + 1);
                        changed = true;
                    }
                }
            }
        }
        dist
    }

    fn track_text() -> impl Strategy<Value = String> {
        (3usize..8, 3usize..8)
            .prop_flat_map(|(w, h)| {
                let n = w * h;
                (
                    Just(w),
                    Just(h),
                    proptest::collection::vec(proptest::bool::weighted(0.3), n),
                    0..n,
                    0..n,
                )
            })
            .prop_map(|(w, h, walls, finish, start)| {
                let start = if start == finish {
                    (start + 1) % (w * h)
                } else {
                    start
                };
                let mut text = "o".repeat(w + 2);
                text.push('\n');
                for y in 0..h {
                    text.push('o');
                    for x in 0..w {
                        let i = y * w + x;
                        text.push(if i == finish {
                            'f'
                        } else if i == start {
                            's'
                        } else if walls[i] {
                            'o'
                        } else {
                            ' '
                        });
                    }
                    text.push_str("o\n");
                }
                text.push_str(&"o".repeat(w + 2));
                text
            })
    }

    proptest! {
        #[test]
        fn distance_field_matches_reference(text in track_text()) {
            match text.parse::<TrackMap>() {
                Ok(track) => {
                    let reference = reference_distances(&track);
                    for (q, _) in track.cells() {
                        prop_assert_eq!(track.distance_at(q), reference.get(&q).copied());
                    }
                    let max = reference.values().copied().max().unwrap_or(0);
                    prop_assert_eq!(track.max_distance(), max);
                }
                Err(SetupError::StartUnreachable { at }) => {
                    let track_without_check = reference_for_unreachable(&text);
                    prop_assert!(!track_without_check.contains(&at));
                }
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
        }

        #[test]
        fn finish_cells_are_zero_and_starts_finite(text in track_text()) {
            if let Ok(track) = text.parse::<TrackMap>() {
                for &f in track.finish_points() {
                    prop_assert_eq!(track.distance_at(f), Some(0));
                }
                for &s in track.start_points() {
                    prop_assert!(track.distance_at(s).unwrap() > 0);
                }
            }
        }
    }

    // Cells reachable from a finish, computed directly from the text for maps
    // that fail validation.
    fn reference_for_unreachable(text: &str) -> Vec<Point> {
        let rows: Vec<Vec<char>> = text.lines().map(|l| l.chars().collect()).collect();
        let at = |q: Point| -> Option<char> {
            rows.get(usize::try_from(q.y).ok()?)?
                .get(usize::try_from(q.x).ok()?)
                .copied()
        };
        let mut reached: Vec<Point> = Vec::new();
        let mut queue: VecDeque<Point> = VecDeque::new();
        for (y, row) in rows.iter().enumerate() {
            for (x, &ch) in row.iter().enumerate() {
                if ch == 'f' {
                    reached.push(p(x as i32, y as i32));
                    queue.push_back(p(x as i32, y as i32));
                }
            }
        }
        while let Some(cell) = queue.pop_front() {
            for n in TrackMap::neighbors(cell) {
                let Some(ch) = at(n) else {
                    continue;
                };
                if !reached.contains(&n) {
                    reached.push(n);
                    if ch != 'o' {
                        queue.push_back(n);
                    }
                }
            }
        }
        reached
    }
}
