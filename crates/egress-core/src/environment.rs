//! Parsed environment descriptions: structure, exits, pedestrians, and fire.
//!
//! The kernel never touches the filesystem; callers hand the raw text of the
//! environment and auxiliary files to the parsers here.

use crate::grid::{CellKind, Coordinate, Grid};
use crate::SimulationError;

/// Where the environment's exits and pedestrians come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvironmentOrigin {
    /// Structure from the environment file; exits from the auxiliary file.
    #[default]
    StructureOnly,
    /// Structure and exits from the environment file.
    StructureAndExits,
    /// Structure and pedestrians from the file; exits from the auxiliary file.
    StructureAndPedestrians,
    /// Structure, exits, and pedestrians all from the environment file.
    StructureExitsAndPedestrians,
    /// Walled empty rectangle generated from the configured dimensions;
    /// exits from the auxiliary file.
    Generated,
}

impl EnvironmentOrigin {
    /// Whether exit placements are read from the auxiliary file.
    #[must_use]
    pub fn uses_auxiliary_exits(self) -> bool {
        matches!(
            self,
            Self::StructureOnly | Self::StructureAndPedestrians | Self::Generated
        )
    }

    /// Whether pedestrians are loaded with the environment instead of being
    /// placed at random each run.
    #[must_use]
    pub fn uses_static_pedestrians(self) -> bool {
        matches!(
            self,
            Self::StructureAndPedestrians | Self::StructureExitsAndPedestrians
        )
    }

    /// Whether exits are loaded with the environment.
    #[must_use]
    pub fn uses_static_exits(self) -> bool {
        matches!(
            self,
            Self::StructureAndExits | Self::StructureExitsAndPedestrians
        )
    }
}

/// An initialized environment description consumed by the simulation.
#[derive(Debug, Clone)]
pub struct EnvironmentLayout {
    lines: usize,
    columns: usize,
    obstacles: Grid<CellKind>,
    /// Exits read from the environment file, one cell each.
    exits: Vec<Vec<Coordinate>>,
    /// Pedestrian origins read from the environment file.
    pedestrians: Vec<Coordinate>,
    initial_fires: Vec<Coordinate>,
    fire_present: bool,
}

impl EnvironmentLayout {
    /// Parses the environment text format.
    ///
    /// The first line carries `L C`; the following `L` rows hold exactly `C`
    /// symbols each: `#` wall, `_` exit (marked as wall in the obstacle grid),
    /// `.` empty, `p`/`P` pedestrian, `*` fire. Whether `_` and `p` register
    /// exits and pedestrians depends on `origin`.
    pub fn parse(text: &str, origin: EnvironmentOrigin) -> Result<Self, SimulationError> {
        let mut rows = text.lines();
        let header = rows.next().ok_or_else(|| SimulationError::EnvironmentParse {
            line: 1,
            message: "missing dimensions header".into(),
        })?;

        let mut header_fields = header.split_whitespace();
        let lines: usize = header_fields
            .next()
            .and_then(|field| field.parse().ok())
            .ok_or_else(|| SimulationError::EnvironmentParse {
                line: 1,
                message: "line count not found in header".into(),
            })?;
        let columns: usize = header_fields
            .next()
            .and_then(|field| field.parse().ok())
            .ok_or_else(|| SimulationError::EnvironmentParse {
                line: 1,
                message: "column count not found in header".into(),
            })?;
        if lines == 0 || columns == 0 {
            return Err(SimulationError::EnvironmentParse {
                line: 1,
                message: "dimensions must be positive".into(),
            });
        }

        let mut layout = Self {
            lines,
            columns,
            obstacles: Grid::new(lines, columns, CellKind::Empty),
            exits: Vec::new(),
            pedestrians: Vec::new(),
            initial_fires: Vec::new(),
            fire_present: false,
        };

        for lin in 0..lines {
            let row = rows.next().ok_or_else(|| SimulationError::EnvironmentParse {
                line: lin + 2,
                message: "fewer rows than the extracted line count".into(),
            })?;
            let mut width = 0usize;
            for (col, symbol) in row.chars().enumerate() {
                if col >= columns {
                    return Err(SimulationError::EnvironmentParse {
                        line: lin + 2,
                        message: "row has more columns than the extracted column count".into(),
                    });
                }
                width += 1;
                layout.process_symbol(symbol, Coordinate::new(lin as i32, col as i32), origin)
                    .map_err(|message| SimulationError::EnvironmentParse {
                        line: lin + 2,
                        message,
                    })?;
            }
            if width < columns {
                return Err(SimulationError::EnvironmentParse {
                    line: lin + 2,
                    message: "row has fewer columns than the extracted column count".into(),
                });
            }
        }

        Ok(layout)
    }

    fn process_symbol(
        &mut self,
        symbol: char,
        at: Coordinate,
        origin: EnvironmentOrigin,
    ) -> Result<(), String> {
        match symbol {
            '#' => self.obstacles[at] = CellKind::Obstacle,
            '_' => {
                // Exits sit on wall cells; the exits grid surfaces them.
                self.obstacles[at] = CellKind::Obstacle;
                if origin.uses_static_exits() {
                    self.exits.push(vec![at]);
                }
            }
            '.' => self.obstacles[at] = CellKind::Empty,
            'p' | 'P' => {
                self.obstacles[at] = CellKind::Empty;
                if origin.uses_static_pedestrians() {
                    self.pedestrians.push(at);
                }
            }
            '*' => {
                self.obstacles[at] = CellKind::Empty;
                self.initial_fires.push(at);
                self.fire_present = true;
            }
            unknown => return Err(format!("unknown symbol {unknown:?}")),
        }
        Ok(())
    }

    /// Generates a walled empty rectangle of the given dimensions.
    #[must_use]
    pub fn generate(lines: usize, columns: usize) -> Self {
        let mut obstacles = Grid::new(lines, columns, CellKind::Obstacle);
        for lin in 1..lines.saturating_sub(1) {
            for col in 1..columns.saturating_sub(1) {
                obstacles[Coordinate::new(lin as i32, col as i32)] = CellKind::Empty;
            }
        }
        Self {
            lines,
            columns,
            obstacles,
            exits: Vec::new(),
            pedestrians: Vec::new(),
            initial_fires: Vec::new(),
            fire_present: false,
        }
    }

    /// Number of lines.
    #[must_use]
    pub const fn lines(&self) -> usize {
        self.lines
    }

    /// Number of columns.
    #[must_use]
    pub const fn columns(&self) -> usize {
        self.columns
    }

    /// The structural grid (walls and obstacles).
    #[must_use]
    pub fn obstacles(&self) -> &Grid<CellKind> {
        &self.obstacles
    }

    /// Exits carried by the environment file, if any.
    #[must_use]
    pub fn exits(&self) -> &[Vec<Coordinate>] {
        &self.exits
    }

    /// Pedestrian origins carried by the environment file, if any.
    #[must_use]
    pub fn pedestrians(&self) -> &[Coordinate] {
        &self.pedestrians
    }

    /// Cells on fire before the first timestep.
    #[must_use]
    pub fn initial_fires(&self) -> &[Coordinate] {
        &self.initial_fires
    }

    /// Whether the environment carries fire.
    #[must_use]
    pub const fn fire_present(&self) -> bool {
        self.fire_present
    }

    /// Number of cells not occupied by walls or obstacles.
    #[must_use]
    pub fn count_empty_cells(&self) -> usize {
        self.obstacles
            .cells()
            .iter()
            .filter(|&&kind| kind == CellKind::Empty)
            .count()
    }
}

/// Parses the auxiliary simulation-set format.
///
/// Each set is a sequence of `<lin> <col> <sep>` triples where `+` extends
/// the current exit with another cell, `,` starts a new exit, and `.`
/// terminates the set. Empty lines are ignored.
pub fn parse_simulation_sets(
    text: &str,
    lines: usize,
    columns: usize,
) -> Result<Vec<Vec<Vec<Coordinate>>>, SimulationError> {
    // Separators may be glued to the second coordinate, so give them room
    // before tokenizing.
    let spaced = text
        .replace('+', " + ")
        .replace(',', " , ")
        .replace('.', " . ");
    let mut tokens = spaced.split_whitespace();

    let mut sets: Vec<Vec<Vec<Coordinate>>> = Vec::new();
    let mut current_set: Vec<Vec<Coordinate>> = Vec::new();
    let mut extend_last = false;

    loop {
        let Some(first) = tokens.next() else {
            break;
        };
        let lin: i32 = first
            .parse()
            .map_err(|_| SimulationError::AuxiliaryParse(format!("expected line, got {first:?}")))?;
        let col: i32 = tokens
            .next()
            .and_then(|token| token.parse().ok())
            .ok_or_else(|| {
                SimulationError::AuxiliaryParse("expected column after line coordinate".into())
            })?;
        let separator = tokens.next().ok_or_else(|| {
            SimulationError::AuxiliaryParse("expected separator after coordinates".into())
        })?;

        if lin < 0 || lin as usize >= lines || col < 0 || col as usize >= columns {
            return Err(SimulationError::AuxiliaryParse(format!(
                "exit cell ({lin}, {col}) lies outside the {lines}x{columns} environment"
            )));
        }
        let cell = Coordinate::new(lin, col);

        if extend_last {
            current_set
                .last_mut()
                .expect("extend separator follows an exit")
                .push(cell);
        } else {
            current_set.push(vec![cell]);
        }

        match separator {
            "+" => extend_last = true,
            "," => extend_last = false,
            "." => {
                sets.push(std::mem::take(&mut current_set));
                extend_last = false;
            }
            unknown => {
                return Err(SimulationError::AuxiliaryParse(format!(
                    "unknown separator {unknown:?}"
                )))
            }
        }
    }

    if !current_set.is_empty() {
        sets.push(current_set);
    }

    Ok(sets)
}
