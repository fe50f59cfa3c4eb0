//! The storage network of a single cell
//!
//! Four storages (snow, canopy, soil, groundwater) and the cell outlet form a
//! small directed graph. Edges carry the flux law moving water from the source
//! to the target node. Exchanges with the atmosphere (snowfall, rain,
//! evaporation) are boundary fluxes and not part of the graph.

use crate::flux::{
    partition_precipitation, power_law, snowmelt, Canopy, PrecipitationPartition, VolumeStress,
};
use hydrocal_core::errors::{HydroError, HydroResult};
use hydrocal_core::ivp::{ModelState, IVP};
use hydrocal_core::parameters::CELL_PARAMETER_NAMES;
use hydrocal_core::timeseries::{FloatValue, Time};
use petgraph::graph::{Graph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

/// Position of the daily outlet accumulator in the state vector
pub const OUTLET: usize = 4;
/// Position of the daily evapotranspiration accumulator in the state vector
pub const EVAPOTRANSPIRATION: usize = 5;
/// Length of the state vector of one cell
pub const STATE_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageKind {
    Snow,
    Canopy,
    Soil,
    Groundwater,
}

impl StorageKind {
    pub const ALL: [StorageKind; 4] = [
        StorageKind::Snow,
        StorageKind::Canopy,
        StorageKind::Soil,
        StorageKind::Groundwater,
    ];

    /// Position in the state vector
    pub fn index(&self) -> usize {
        match self {
            StorageKind::Snow => 0,
            StorageKind::Canopy => 1,
            StorageKind::Soil => 2,
            StorageKind::Groundwater => 3,
        }
    }

    /// Volume (mm) at the start of every run
    pub fn initial_volume(&self) -> FloatValue {
        match self {
            StorageKind::Snow | StorageKind::Canopy => 0.0,
            StorageKind::Soil => 15.0,
            StorageKind::Groundwater => 80.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkNode {
    Storage(StorageKind),
    Outlet,
}

impl NetworkNode {
    pub fn state_index(&self) -> usize {
        match self {
            NetworkNode::Storage(kind) => kind.index(),
            NetworkNode::Outlet => OUTLET,
        }
    }
}

/// Calibrated properties of one cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellParameters {
    /// Residence time soil to groundwater (days)
    pub tr_soil_gw: FloatValue,
    /// Residence time soil to outlet (days)
    pub tr_soil_out: FloatValue,
    /// Residence time groundwater to outlet (days)
    pub tr_gw_out: FloatValue,
    /// Reference soil volume (mm)
    pub v0_soil: FloatValue,
    pub beta_soil_gw: FloatValue,
    pub beta_soil_out: FloatValue,
    /// Soil volume without transpiration stress (mm)
    pub etv1: FloatValue,
    /// Fraction of `etv1` at which transpiration stops
    pub f_etv0: FloatValue,
    /// Degree-day factor (mm/(°C day))
    pub meltrate: FloatValue,
    /// Rain/snow and melt threshold (°C)
    pub snow_melt_temp: FloatValue,
    /// Leaf area index
    pub lai: FloatValue,
    /// Fraction of rain hitting the canopy
    pub canopy_closure: FloatValue,
}

impl CellParameters {
    /// Reads the twelve cell parameters in their canonical order
    ///
    /// Parameters that would make a flux law undefined are rejected.
    pub fn from_slice(values: &[FloatValue]) -> HydroResult<Self> {
        let values: &[FloatValue; 12] = values.try_into().map_err(|_| {
            HydroError::invalid_parameter(
                "<cell>",
                format!("expected {} values, got {}", CELL_PARAMETER_NAMES.len(), values.len()),
            )
        })?;
        for (name, value) in CELL_PARAMETER_NAMES.iter().zip(values) {
            if !value.is_finite() {
                return Err(HydroError::invalid_parameter(*name, format!("{} is not finite", value)));
            }
        }

        let [
            tr_soil_gw,
            tr_soil_out,
            tr_gw_out,
            v0_soil,
            beta_soil_gw,
            beta_soil_out,
            etv1,
            f_etv0,
            meltrate,
            snow_melt_temp,
            lai,
            canopy_closure,
        ] = *values;
        let parameters = Self {
            tr_soil_gw,
            tr_soil_out,
            tr_gw_out,
            v0_soil,
            beta_soil_gw,
            beta_soil_out,
            etv1,
            f_etv0,
            meltrate,
            snow_melt_temp,
            lai,
            canopy_closure,
        };
        parameters.check_positive()?;
        Ok(parameters)
    }

    fn check_positive(&self) -> HydroResult<()> {
        let strictly_positive = [
            ("tr_soil_gw", self.tr_soil_gw),
            ("tr_soil_out", self.tr_soil_out),
            ("tr_gw_out", self.tr_gw_out),
            ("V0_soil", self.v0_soil),
            ("beta_soil_gw", self.beta_soil_gw),
            ("beta_soil_out", self.beta_soil_out),
            ("LAI", self.lai),
        ];
        for (name, value) in strictly_positive {
            if value <= 0.0 {
                return Err(HydroError::invalid_parameter(
                    name,
                    format!("{} must be strictly positive", value),
                ));
            }
        }
        Ok(())
    }
}

/// A flux law attached to a network edge
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FluxLaw {
    PowerLaw {
        v_ref: FloatValue,
        beta: FloatValue,
        residence_time: FloatValue,
    },
    SnowMelt {
        meltrate: FloatValue,
        threshold: FloatValue,
    },
    /// Drip of intercepted rain once the canopy fills up
    InterceptionOverflow(Canopy),
}

impl FluxLaw {
    /// Rate (mm/day) leaving a source storage holding `volume`
    pub fn rate(&self, volume: FloatValue, drivers: &DayDrivers) -> FloatValue {
        match self {
            FluxLaw::PowerLaw {
                v_ref,
                beta,
                residence_time,
            } => power_law(volume, *v_ref, *beta, *residence_time),
            FluxLaw::SnowMelt {
                meltrate,
                threshold,
            } => snowmelt(volume, drivers.temperature, *threshold, *meltrate),
            FluxLaw::InterceptionOverflow(canopy) => {
                canopy.overflow(drivers.precipitation.intercepted, volume)
            }
        }
    }
}

/// Forcing of one cell for one day, constant during the day
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayDrivers {
    /// °C
    pub temperature: FloatValue,
    pub precipitation: PrecipitationPartition,
    /// Potential evapotranspiration (mm/day)
    pub pet: FloatValue,
}

/// Water fluxes of a cell that cross its boundary, in mm/day
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundaryFluxes {
    pub canopy_evaporation: FloatValue,
    pub transpiration: FloatValue,
}

/// Snow, canopy, soil and groundwater storages of one cell
#[derive(Debug, Clone)]
pub struct StorageNetwork {
    graph: Graph<NetworkNode, FluxLaw>,
    parameters: CellParameters,
    canopy: Canopy,
    stress: VolumeStress,
}

impl StorageNetwork {
    pub fn new(parameters: CellParameters) -> Self {
        let canopy = Canopy::from_lai(parameters.lai);
        let mut graph = Graph::new();

        let nodes: Vec<NodeIndex> = StorageKind::ALL
            .iter()
            .map(|kind| graph.add_node(NetworkNode::Storage(*kind)))
            .collect();
        let node = |kind: StorageKind| nodes[kind.index()];
        let outlet = graph.add_node(NetworkNode::Outlet);

        graph.add_edge(
            node(StorageKind::Soil),
            outlet,
            FluxLaw::PowerLaw {
                v_ref: parameters.v0_soil,
                beta: parameters.beta_soil_out,
                residence_time: parameters.tr_soil_out,
            },
        );
        graph.add_edge(
            node(StorageKind::Soil),
            node(StorageKind::Groundwater),
            FluxLaw::PowerLaw {
                v_ref: parameters.v0_soil,
                beta: parameters.beta_soil_gw,
                residence_time: parameters.tr_soil_gw,
            },
        );
        graph.add_edge(
            node(StorageKind::Groundwater),
            outlet,
            FluxLaw::PowerLaw {
                v_ref: 1.0,
                beta: 1.0,
                residence_time: parameters.tr_gw_out,
            },
        );
        graph.add_edge(
            node(StorageKind::Canopy),
            node(StorageKind::Soil),
            FluxLaw::InterceptionOverflow(canopy),
        );
        graph.add_edge(
            node(StorageKind::Snow),
            node(StorageKind::Soil),
            FluxLaw::SnowMelt {
                meltrate: parameters.meltrate,
                threshold: parameters.snow_melt_temp,
            },
        );

        Self {
            graph,
            parameters,
            canopy,
            stress: VolumeStress::new(parameters.etv1, parameters.f_etv0),
        }
    }

    /// Builds the network of a cell from its twelve parameter values
    pub fn from_slice(values: &[FloatValue]) -> HydroResult<Self> {
        Ok(Self::new(CellParameters::from_slice(values)?))
    }

    pub fn graph(&self) -> &Graph<NetworkNode, FluxLaw> {
        &self.graph
    }

    pub fn parameters(&self) -> &CellParameters {
        &self.parameters
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Storage volumes at the start of a run with empty accumulators
    pub fn initial_state(&self) -> ModelState {
        let mut state = ModelState::zeros(STATE_LEN);
        for kind in StorageKind::ALL {
            state[kind.index()] = kind.initial_volume();
        }
        state
    }

    /// Total water held in the storages of a state (mm)
    pub fn storage(state: &ModelState) -> FloatValue {
        StorageKind::ALL.iter().map(|kind| state[kind.index()]).sum()
    }

    /// The day's forcing as seen by this cell
    pub fn drivers(
        &self,
        precipitation: FloatValue,
        temperature: FloatValue,
        pet: FloatValue,
    ) -> DayDrivers {
        DayDrivers {
            temperature,
            precipitation: partition_precipitation(
                precipitation,
                temperature,
                self.parameters.snow_melt_temp,
                self.parameters.canopy_closure,
            ),
            pet,
        }
    }

    /// Evaporation from the canopy first, the remaining demand limited by soil moisture
    pub fn boundary_fluxes(&self, drivers: &DayDrivers, y: &ModelState) -> BoundaryFluxes {
        let pet = drivers.pet.max(0.0);
        let canopy_evaporation = self
            .canopy
            .evaporation(pet, y[StorageKind::Canopy.index()]);
        let transpiration =
            (pet - canopy_evaporation).max(0.0) * self.stress.stress(y[StorageKind::Soil.index()]);
        BoundaryFluxes {
            canopy_evaporation,
            transpiration,
        }
    }
}

impl IVP<Time, ModelState> for StorageNetwork {
    type Inputs = DayDrivers;

    fn calculate_dy_dt(
        &self,
        _t: Time,
        drivers: &DayDrivers,
        y: &ModelState,
        dy_dt: &mut ModelState,
    ) {
        dy_dt.fill(0.0);

        for edge in self.graph.edge_references() {
            let source = self.graph[edge.source()].state_index();
            let target = self.graph[edge.target()].state_index();
            let q = edge.weight().rate(y[source], drivers);
            dy_dt[source] -= q;
            dy_dt[target] += q;
        }

        let boundary = self.boundary_fluxes(drivers, y);
        dy_dt[StorageKind::Snow.index()] += drivers.precipitation.snowfall;
        dy_dt[StorageKind::Canopy.index()] +=
            drivers.precipitation.intercepted - boundary.canopy_evaporation;
        dy_dt[StorageKind::Soil.index()] +=
            drivers.precipitation.throughfall - boundary.transpiration;
        dy_dt[EVAPOTRANSPIRATION] = boundary.canopy_evaporation + boundary.transpiration;
    }
}
