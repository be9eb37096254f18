use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{EngineError, Result};

/// A named, ordered set of labelled items identified by a single letter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub letter: char,
    pub items: Vec<String>,
}

impl Dimension {
    pub fn new<S: Into<String>>(name: impl Into<String>, letter: char, items: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            letter,
            items: items.into_iter().map(Into::into).collect(),
        }
    }

    /// Time-like dimension with one item per year in `first..=last`
    pub fn years(name: impl Into<String>, letter: char, first: i32, last: i32) -> Self {
        Self::new(name, letter, (first..=last).map(|y| y.to_string()))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn index_of(&self, item: &str) -> Option<usize> {
        self.items.iter().position(|i| i == item)
    }

    pub fn position(&self, item: &str) -> Result<usize> {
        self.index_of(item).ok_or_else(|| EngineError::UnknownItem {
            letter: self.letter,
            item: item.to_string(),
        })
    }
}

/// Ordered collection of dimensions with unique letters
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDimensionSet")]
pub struct DimensionSet {
    dims: Vec<Dimension>,
}

/// Decoded form, checked by [`DimensionSet::new`] before use
#[derive(Deserialize)]
struct RawDimensionSet {
    dims: Vec<Dimension>,
}

impl TryFrom<RawDimensionSet> for DimensionSet {
    type Error = EngineError;

    fn try_from(raw: RawDimensionSet) -> Result<Self> {
        Self::new(raw.dims)
    }
}

impl DimensionSet {
    pub fn new(dims: Vec<Dimension>) -> Result<Self> {
        for (i, dim) in dims.iter().enumerate() {
            if dims[..i].iter().any(|d| d.letter == dim.letter) {
                return Err(EngineError::DuplicateAxis(dim.letter));
            }
        }
        Ok(Self { dims })
    }

    /// Dimensionless set, used for scalars
    pub fn empty() -> Self {
        Self { dims: Vec::new() }
    }

    pub fn letters(&self) -> Vec<char> {
        self.dims.iter().map(|d| d.letter).collect()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.dims.iter().map(Dimension::len).collect()
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dimension> {
        self.dims.iter()
    }

    pub fn contains(&self, letter: char) -> bool {
        self.dims.iter().any(|d| d.letter == letter)
    }

    pub fn position(&self, letter: char) -> Option<usize> {
        self.dims.iter().position(|d| d.letter == letter)
    }

    pub fn get(&self, letter: char) -> Option<&Dimension> {
        self.dims.iter().find(|d| d.letter == letter)
    }

    pub fn dim(&self, letter: char) -> Result<&Dimension> {
        self.get(letter).ok_or_else(|| EngineError::UnknownAxis {
            letter,
            context: self.to_string(),
        })
    }

    pub fn first_letter(&self) -> Option<char> {
        self.dims.first().map(|d| d.letter)
    }

    /// Subset in the requested letter order
    pub fn subset(&self, letters: &[char]) -> Result<Self> {
        let dims = letters
            .iter()
            .map(|&l| self.dim(l).cloned())
            .collect::<Result<Vec<_>>>()?;
        Self::new(dims)
    }

    pub fn is_subset_of(&self, other: &DimensionSet) -> bool {
        self.dims.iter().all(|d| other.contains(d.letter))
    }

    /// Union keeping `self` order, then the letters only `other` has.
    /// Shared letters must carry identical items.
    pub fn union_with(&self, other: &DimensionSet) -> Result<Self> {
        let mut dims = self.dims.clone();
        for dim in &other.dims {
            match self.get(dim.letter) {
                Some(own) => check_same_items(own, dim)?,
                None => dims.push(dim.clone()),
            }
        }
        Ok(Self { dims })
    }

    /// Letters present in both, in `self` order
    pub fn intersect_with(&self, other: &DimensionSet) -> Result<Self> {
        let mut dims = Vec::new();
        for dim in &self.dims {
            if let Some(theirs) = other.get(dim.letter) {
                check_same_items(dim, theirs)?;
                dims.push(dim.clone());
            }
        }
        Ok(Self { dims })
    }

    /// Letters of `self` that `other` lacks
    pub fn difference_with(&self, other: &DimensionSet) -> Self {
        Self {
            dims: self
                .dims
                .iter()
                .filter(|d| !other.contains(d.letter))
                .cloned()
                .collect(),
        }
    }

    /// Swap the dimension at `letter` for `replacement`, keeping its position
    pub fn replace(&self, letter: char, replacement: Dimension) -> Result<Self> {
        let pos = self.position(letter).ok_or_else(|| EngineError::UnknownAxis {
            letter,
            context: self.to_string(),
        })?;
        let mut dims = self.dims.clone();
        dims[pos] = replacement;
        Self::new(dims)
    }

    /// Same set with `letter` moved to the front
    pub fn with_leading(&self, letter: char) -> Result<Self> {
        let pos = self.position(letter).ok_or_else(|| EngineError::UnknownAxis {
            letter,
            context: self.to_string(),
        })?;
        let mut dims = self.dims.clone();
        let dim = dims.remove(pos);
        dims.insert(0, dim);
        Ok(Self { dims })
    }

    /// Every dimension except `letter`
    pub fn without(&self, letter: char) -> Self {
        Self {
            dims: self.dims.iter().filter(|d| d.letter != letter).cloned().collect(),
        }
    }
}

fn check_same_items(a: &Dimension, b: &Dimension) -> Result<()> {
    if a.items != b.items {
        return Err(EngineError::AxisMismatch {
            letter: a.letter,
            reason: format!("{} items vs {} items", a.len(), b.len()),
        });
    }
    Ok(())
}

impl fmt::Display for DimensionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", dim.letter)?;
        }
        write!(f, ")")
    }
}
