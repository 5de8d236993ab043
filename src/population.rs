//! Populations and population-pair blocks.
//!
//! The reservoir holds two populations. Excitatory neurons come first in
//! every index space, inhibitory neurons second, and each is indexed from 0
//! within its own population. Connectivity is split into four blocks named
//! source-then-target.

use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Neuron population. Dale's law: the sign of every outgoing weight is fixed
/// by the source population.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Population {
    Excitatory,
    Inhibitory,
}

impl Population {
    /// Weight sign for synapses leaving this population.
    #[inline]
    pub fn sign(self) -> f32 {
        match self {
            Self::Excitatory => 1.0,
            Self::Inhibitory => -1.0,
        }
    }

    #[inline]
    pub fn short_name(self) -> &'static str {
        match self {
            Self::Excitatory => "ex",
            Self::Inhibitory => "in",
        }
    }
}

impl fmt::Display for Population {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// A population-pair connectivity block, named source then target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Block {
    /// ex -> ex
    ExEx,
    /// in -> in
    InIn,
    /// in -> ex
    InEx,
    /// ex -> in
    ExIn,
}

impl Block {
    /// Canonical iteration order for generation, partitioning and persistence.
    pub const ALL: [Block; 4] = [Block::ExEx, Block::InIn, Block::InEx, Block::ExIn];

    #[inline]
    pub fn source(self) -> Population {
        match self {
            Self::ExEx | Self::ExIn => Population::Excitatory,
            Self::InIn | Self::InEx => Population::Inhibitory,
        }
    }

    #[inline]
    pub fn target(self) -> Population {
        match self {
            Self::ExEx | Self::InEx => Population::Excitatory,
            Self::InIn | Self::ExIn => Population::Inhibitory,
        }
    }

    /// Recurrent blocks never connect a neuron to itself.
    #[inline]
    pub fn excludes_self(self) -> bool {
        self.source() == self.target()
    }

    #[inline]
    pub fn sign(self) -> f32 {
        self.source().sign()
    }

    /// Position in [`Block::ALL`].
    #[inline]
    pub fn ordinal(self) -> usize {
        match self {
            Self::ExEx => 0,
            Self::InIn => 1,
            Self::InEx => 2,
            Self::ExIn => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ExEx => "exex",
            Self::InIn => "inin",
            Self::InEx => "inex",
            Self::ExIn => "exin",
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Block {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Block::ALL
            .into_iter()
            .find(|b| b.name() == s)
            .ok_or_else(|| format!("unknown block '{s}', expected one of exex, inin, inex, exin"))
    }
}

/// One value per block, addressable by [`Block`] or by block name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, bound(deserialize = "T: Deserialize<'de> + Default"))]
pub struct BlockSet<T> {
    pub exex: T,
    pub inin: T,
    pub inex: T,
    pub exin: T,
}

impl<T> BlockSet<T> {
    /// Build a set by calling `f` once per block in [`Block::ALL`] order.
    pub fn from_fn(mut f: impl FnMut(Block) -> T) -> Self {
        let exex = f(Block::ExEx);
        let inin = f(Block::InIn);
        let inex = f(Block::InEx);
        let exin = f(Block::ExIn);
        Self { exex, inin, inex, exin }
    }

    /// Fallible [`BlockSet::from_fn`]; stops at the first error.
    pub fn try_from_fn<E>(mut f: impl FnMut(Block) -> Result<T, E>) -> Result<Self, E> {
        let exex = f(Block::ExEx)?;
        let inin = f(Block::InIn)?;
        let inex = f(Block::InEx)?;
        let exin = f(Block::ExIn)?;
        Ok(Self { exex, inin, inex, exin })
    }

    pub fn get_by_name(&self, name: &str) -> Option<&T> {
        name.parse::<Block>().ok().map(|b| &self[b])
    }

    pub fn iter(&self) -> impl Iterator<Item = (Block, &T)> {
        Block::ALL.into_iter().map(move |b| (b, &self[b]))
    }

    pub fn map<U>(&self, mut f: impl FnMut(Block, &T) -> U) -> BlockSet<U> {
        BlockSet::from_fn(|b| f(b, &self[b]))
    }
}

impl<T> Index<Block> for BlockSet<T> {
    type Output = T;

    fn index(&self, block: Block) -> &T {
        match block {
            Block::ExEx => &self.exex,
            Block::InIn => &self.inin,
            Block::InEx => &self.inex,
            Block::ExIn => &self.exin,
        }
    }
}

impl<T> IndexMut<Block> for BlockSet<T> {
    fn index_mut(&mut self, block: Block) -> &mut T {
        match block {
            Block::ExEx => &mut self.exex,
            Block::InIn => &mut self.inin,
            Block::InEx => &mut self.inex,
            Block::ExIn => &mut self.exin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_endpoints() {
        assert_eq!(Block::InEx.source(), Population::Inhibitory);
        assert_eq!(Block::InEx.target(), Population::Excitatory);
        assert_eq!(Block::ExIn.source(), Population::Excitatory);
        assert_eq!(Block::ExIn.target(), Population::Inhibitory);
    }

    #[test]
    fn only_recurrent_blocks_exclude_self() {
        assert!(Block::ExEx.excludes_self());
        assert!(Block::InIn.excludes_self());
        assert!(!Block::InEx.excludes_self());
        assert!(!Block::ExIn.excludes_self());
    }

    #[test]
    fn dale_sign_follows_source() {
        assert_eq!(Block::ExEx.sign(), 1.0);
        assert_eq!(Block::ExIn.sign(), 1.0);
        assert_eq!(Block::InIn.sign(), -1.0);
        assert_eq!(Block::InEx.sign(), -1.0);
    }

    #[test]
    fn names_round_trip() {
        for b in Block::ALL {
            assert_eq!(b.name().parse::<Block>(), Ok(b));
            assert_eq!(Block::ALL[b.ordinal()], b);
        }
        assert!("exinx".parse::<Block>().is_err());
    }

    #[test]
    fn block_set_lookup_by_name() {
        let set = BlockSet::from_fn(|b| b.ordinal());
        assert_eq!(set.get_by_name("inex"), Some(&2));
        assert_eq!(set[Block::ExIn], 3);
        assert_eq!(set.get_by_name("bogus"), None);
    }
}
