// src/kind.rs

//! The closed set of holon kinds
//!
//! The same enumeration names both the kind of an artifact and the typed
//! collection a dependency reference is filed under, so it is exposed twice:
//! as [`HolonKind`] and as the [`DependencyKind`] alias.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Kind of a holon
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum HolonKind {
    #[strum(serialize = "OAPP")]
    #[serde(rename = "OAPP")]
    Oapp,
    Runtime,
    Library,
    Template,
    #[strum(serialize = "NFT")]
    #[serde(rename = "NFT")]
    Nft,
    #[strum(serialize = "GeoNFT")]
    #[serde(rename = "GeoNFT")]
    GeoNft,
    #[strum(serialize = "NFTCollection")]
    #[serde(rename = "NFTCollection")]
    NftCollection,
    #[strum(serialize = "GeoNFTCollection")]
    #[serde(rename = "GeoNFTCollection")]
    GeoNftCollection,
    GeoHotSpot,
    Quest,
    Mission,
    Chapter,
    InventoryItem,
    CelestialSpace,
    CelestialBody,
    Zome,
    Holon,
    CelestialBodyMetaDataDNA,
    ZomeMetaDataDNA,
    HolonMetaDataDNA,
}

/// Kind of the collection a dependency reference is filed under
pub type DependencyKind = HolonKind;

impl HolonKind {
    /// Directory name used under `Dependencies/` and the install roots
    pub fn dir_name(&self) -> &str {
        self.as_ref()
    }

    /// Plural display name for the typed dependency collection
    pub fn collection_name(&self) -> &'static str {
        match self {
            Self::Oapp => "OAPPs",
            Self::Runtime => "Runtimes",
            Self::Library => "Libraries",
            Self::Template => "Templates",
            Self::Nft => "NFTs",
            Self::GeoNft => "GeoNFTs",
            Self::NftCollection => "NFTCollections",
            Self::GeoNftCollection => "GeoNFTCollections",
            Self::GeoHotSpot => "GeoHotSpots",
            Self::Quest => "Quests",
            Self::Mission => "Missions",
            Self::Chapter => "Chapters",
            Self::InventoryItem => "InventoryItems",
            Self::CelestialSpace => "CelestialSpaces",
            Self::CelestialBody => "CelestialBodies",
            Self::Zome => "Zomes",
            Self::Holon => "Holons",
            Self::CelestialBodyMetaDataDNA => "CelestialBodiesMetaDataDNA",
            Self::ZomeMetaDataDNA => "ZomesMetaDataDNA",
            Self::HolonMetaDataDNA => "HolonsMetaDataDNA",
        }
    }

    /// File extension of a published package of this kind
    pub fn package_extension(&self) -> &'static str {
        match self {
            Self::Oapp => "oapp",
            Self::Runtime => "oruntime",
            Self::Library => "olib",
            Self::Template => "oapptemplate",
            Self::Nft => "onft",
            Self::GeoNft => "ogeonft",
            Self::NftCollection => "onftcollection",
            Self::GeoNftCollection => "ogeonftcollection",
            Self::GeoHotSpot => "ogeohotspot",
            Self::Quest => "oquest",
            Self::Mission => "omission",
            Self::Chapter => "ochapter",
            Self::InventoryItem => "oinventoryitem",
            Self::CelestialSpace => "ocelestialspace",
            Self::CelestialBody => "ocelestialbody",
            Self::Zome => "ozome",
            Self::Holon => "oholon",
            Self::CelestialBodyMetaDataDNA => "ocelestialbodydna",
            Self::ZomeMetaDataDNA => "ozomedna",
            Self::HolonMetaDataDNA => "oholondna",
        }
    }
}
