//! Register map of the HGCROC v2 (SiPM variant)
//!
//! Every page of the chip with its id, and the six kinds
//! of pages. Locations are (register, min bit, number of
//! bits), spread parameters carry their low bits in the
//! first location.

use std::collections::HashMap;
use std::sync::{
  Arc,
  OnceLock,
};

use crate::register_maps::{
  LookupTable,
  Parameter,
  RegisterLocation,
  RegisterMap,
  RegisterMapError,
};

/// (name, locations, default)
type ParameterSpec = (&'static str, &'static [(u32, u32, u32)], u32);

const GLOBAL_ANALOG : &[ParameterSpec] = &[
  ("ON_DAC_TRIM", &[(0,0,1)], 1),
  ("ON_INPUT_DAC", &[(0,1,1)], 1),
  ("ON_CONV", &[(0,2,1)], 1),
  ("ON_PA", &[(0,3,1)], 1),
  ("GAIN_CONV", &[(0,4,4)], 0b0100),
  ("ON_RTR", &[(1,0,1)], 1),
  ("SW_SUPER_CONV", &[(1,1,1)], 1),
  ("DACB_VB_CONV", &[(1,2,6)], 0b110011),
  ("ON_TOA", &[(2,0,1)], 1),
  ("ON_TOT", &[(2,1,1)], 1),
  ("DACB_VBI_PA", &[(2,2,6)], 0b011111),
  ("IBI_SK", &[(3,0,2)], 0),
  ("IBO_SK", &[(3,2,6)], 0b001010),
  ("IBI_INV", &[(4,0,2)], 0),
  ("IBO_INV", &[(4,2,6)], 0b001010),
  ("IBI_NOINV", &[(5,0,2)], 0),
  ("IBO_NOINV", &[(5,2,6)], 0b001010),
  ("IBI_INV_BUF", &[(6,0,2)], 0b11),
  ("IBO_INV_BUF", &[(6,2,6)], 0b100110),
  ("IBI_NOINV_BUF", &[(7,0,2)], 0b11),
  ("IBO_NOINV_BUF", &[(7,2,6)], 0b100110),
  ("SW_CD", &[(8,0,3)], 0b111),
  ("EN_HYST_TOT", &[(8,3,1)], 0),
  ("SW_CF_COMP", &[(8,4,4)], 0b1010),
  ("SW_CF", &[(9,0,4)], 0b1010),
  ("SW_RF", &[(9,4,4)], 0b1000),
  ("CLR_SHAPERTAIL", &[(10,1,1)], 0),
  ("SELRISINGEDGE", &[(10,2,1)], 1),
  ("SELEXTADC", &[(10,3,1)], 0),
  ("CLR_ADC", &[(10,4,1)], 0),
  ("S_SK", &[(10,5,3)], 0b010),
  ("S_INV", &[(11,2,3)], 0b010),
  ("S_NOINV", &[(11,5,3)], 0b010),
  ("S_INV_BUF", &[(12,2,3)], 0b110),
  ("S_NOINV_BUF", &[(12,5,3)], 0b110),
  ("REF_ADC", &[(13,0,2)], 0),
  ("DELAY40", &[(13,2,3)], 0),
  ("DELAY65", &[(13,5,3)], 0),
  ("ON_REF_ADC", &[(14,0,1)], 1),
  ("POL_ADC", &[(14,1,1)], 1),
  ("DELAY87", &[(14,2,3)], 0),
  ("DELAY9", &[(14,5,3)], 0),
];

const REFERENCE_VOLTAGE : &[ParameterSpec] = &[
  ("PROBE_VREF_PA", &[(0,0,1)], 0),
  ("PROBE_VREF_TIME", &[(0,1,1)], 0),
  ("REFI", &[(0,2,2)], 0b11),
  ("VBG_1V", &[(0,4,3)], 0b111),
  ("ON_DAC", &[(0,7,1)], 1),
  ("NOINV_VREF", &[(1,0,2), (5,0,8)], 0b0100111100),
  ("INV_VREF", &[(1,2,2), (4,0,8)], 0b0110000000),
  ("TOA_VREF", &[(1,4,2), (3,0,8)], 0b0001110000),
  ("TOT_VREF", &[(1,6,2), (2,0,8)], 0b0110110000),
  ("CALIB_DAC", &[(6,0,8), (7,0,4)], 0),
  ("INTCTEST", &[(7,6,1)], 0),
  ("EXTCTEST", &[(7,7,1)], 0),
  ("PROBE_DC", &[(8,0,8)], 0),
];

const MASTER_TDC : &[ParameterSpec] = &[
  ("GLOBAL_TA_SELECT_GAIN_TOA", &[(0,0,4)], 0b0011),
  ("GLOBAL_TA_SELECT_GAIN_TOT", &[(0,4,4)], 0b0011),
  ("GLOBAL_MODE_NO_TOT_SUB", &[(1,0,1)], 0),
  ("GLOBAL_LATENCY_TIME", &[(1,1,4)], 0b1010),
  ("GLOBAL_MODE_FTDC_TOA_S0", &[(1,5,1)], 0),
  ("GLOBAL_MODE_FTDC_TOA_S1", &[(1,6,1)], 1),
  ("GLOBAL_SEU_TIME_OUT", &[(1,7,1)], 1),
  ("BIAS_FOLLOWER_CAL_P_D", &[(2,0,4)], 0),
  ("BIAS_FOLLOWER_CAL_P_EN", &[(2,4,1)], 0),
  ("INV_FRONT_40MHZ", &[(2,5,1)], 0),
  ("START_COUNTER", &[(2,6,1)], 1),
  ("CALIB_CHANNEL_DLL", &[(2,7,1)], 0),
  ("VD_CTDC_P_D", &[(3,0,5)], 0),
  ("VD_CTDC_P_DAC_EN", &[(3,5,1)], 0),
  ("EN_MASTER_CTDC_VOUT_INIT", &[(3,6,1)], 0),
  ("EN_MASTER_CTDC_DLL", &[(3,7,1)], 1),
  ("BIAS_CAL_DAC_CTDC_P_D", &[(4,0,2), (7,6,2)], 0b0000),
  ("CTDC_CALIB_FREQUENCY", &[(4,2,6)], 0b000010),
  ("GLOBAL_MODE_TOA_DIRECT_OUTPUT", &[(5,0,1)], 0),
  ("BIAS_I_CTDC_D", &[(5,1,6)], 0b011000),
  ("FOLLOWER_CTDC_EN", &[(5,7,1)], 1),
  ("GLOBAL_EN_BUFFER_CTDC", &[(6,0,1)], 0),
  ("VD_CTDC_N_FORCE_MAX", &[(6,1,1)], 1),
  ("VD_CTDC_N_D", &[(6,2,5)], 0),
  ("VD_CTDC_N_DAC_EN", &[(6,7,1)], 0),
  ("CTRL_IN_REF_CTDC_P_D", &[(7,0,5)], 0),
  ("CTRL_IN_REF_CTDC_P_EN", &[(7,5,1)], 0),
  ("CTRL_IN_SIG_CTDC_P_D", &[(8,0,5)], 0),
  ("CTRL_IN_SIG_CTDC_P_EN", &[(8,5,1)], 0),
  ("GLOBAL_INIT_DAC_B_CTDC", &[(8,6,1)], 0),
  ("BIAS_CAL_DAC_CTDC_P_EN", &[(8,7,1)], 0),
  ("VD_FTDC_P_D", &[(9,0,5)], 0),
  ("VD_FTDC_P_DAC_EN", &[(9,5,1)], 0),
  ("EN_MASTER_FTDC_VOUT_INIT", &[(9,6,1)], 0),
  ("EN_MASTER_FTDC_DLL", &[(9,7,1)], 1),
  ("BIAS_CAL_DAC_FTDC_P_D", &[(10,0,2), (14,6,2)], 0b0000),
  ("FTDC_CALIB_FREQUENCY", &[(10,2,6)], 0b000010),
  ("EN_REF_BG", &[(11,0,1)], 1),
  ("BIAS_I_FTDC_D", &[(11,1,6)], 0b011000),
  ("FOLLOWER_FTDC_EN", &[(11,7,1)], 1),
  ("GLOBAL_EN_BUFFER_FTDC", &[(12,0,1)], 0),
  ("VD_FTDC_N_FORCE_MAX", &[(12,1,1)], 1),
  ("VD_FTDC_N_D", &[(12,2,5)], 0),
  ("VD_FTDC_N_DAC_EN", &[(12,7,1)], 0),
  ("CTRL_IN_SIG_FTDC_P_D", &[(13,0,5)], 0),
  ("CTRL_IN_SIG_FTDC_P_EN", &[(13,5,1)], 0),
  ("GLOBAL_INIT_DAC_B_FTDC", &[(13,6,1)], 0),
  ("BIAS_CAL_DAC_FTDC_P_EN", &[(13,7,1)], 0),
  ("CTRL_IN_REF_FTDC_P_D", &[(14,0,5)], 0),
  ("CTRL_IN_REF_FTDC_P_EN", &[(14,5,1)], 0),
  ("GLOBAL_DISABLE_TOT_LIMIT", &[(15,0,1)], 0),
  ("GLOBAL_FORCE_EN_CLK", &[(15,1,1)], 0),
  ("GLOBAL_FORCE_EN_OUTPUT_DATA", &[(15,2,1)], 0),
  ("GLOBAL_FORCE_EN_TOT", &[(15,3,1)], 0),
];

const CHANNEL_WISE : &[ParameterSpec] = &[
  ("INPUTDAC", &[(0,0,6)], 0b011111),
  ("DACB", &[(2,6,2), (1,6,2), (0,6,2)], 0b111111),
  ("SIGN_DAC", &[(1,0,1)], 0),
  ("REF_DAC_TOA", &[(1,1,5)], 0),
  ("PROBE_NOINV", &[(2,0,1)], 0),
  ("REF_DAC_TOT", &[(2,1,5)], 0),
  ("MASK_TOA", &[(3,0,1)], 0),
  ("REF_DAC_INV", &[(3,1,5)], 0),
  ("SEL_TRIGGER_TOA", &[(3,6,1)], 0),
  ("PROBE_INV", &[(3,7,1)], 0),
  ("PROBE_PA", &[(4,0,1)], 0),
  ("LOWRANGE", &[(4,1,1)], 0),
  ("HIGHRANGE", &[(4,2,1)], 0),
  ("CHANNEL_OFF", &[(4,3,1)], 0),
  ("SEL_TRIGGER_TOT", &[(4,4,1)], 0),
  ("MASK_TOT", &[(4,5,1)], 0),
  ("PROBE_TOT", &[(4,6,1)], 0),
  ("PROBE_TOA", &[(4,7,1)], 0),
  ("DAC_CAL_FTDC_TOA", &[(5,0,6)], 0),
  ("MASK_ADC", &[(5,7,1)], 0),
  ("DAC_CAL_CTDC_TOA", &[(6,0,6)], 0),
  ("DAC_CAL_FTDC_TOT", &[(7,0,6)], 0),
  ("DAC_CAL_CTDC_TOT", &[(8,0,6)], 0),
  ("IN_FTDC_ENCODER_TOA", &[(9,0,6)], 0),
  ("IN_FTDC_ENCODER_TOT", &[(10,0,6)], 0),
  ("DIS_TDC", &[(10,7,1)], 0),
  ("EXTDATA", &[(13,0,8), (11,0,2)], 0),
  ("MASK_ALIGNBUFFER", &[(11,7,1)], 0),
  ("ADC_PEDESTAL", &[(12,0,8)], 0),
];

const DIGITAL_HALF : &[ParameterSpec] = &[
  ("SELRAWDATA", &[(0,0,1)], 1),
  ("SELTC4", &[(0,1,1)], 1),
  ("CMDSELEDGE", &[(0,2,1)], 1),
  ("ADC_TH", &[(0,4,4)], 0),
  ("MULTFACTOR", &[(1,0,5)], 0b11001),
  ("L1OFFSET", &[(2,0,8), (1,7,1)], 0b000001000),
  ("IDLEFRAME", &[(3,0,8), (4,0,8), (5,0,8), (6,0,4)], 0b1100110011001100110011001100),
  ("BYPASSCH0", &[(6,4,1)], 0),
  ("BYPASSCH17", &[(6,5,1)], 0),
  ("BYPASSCH35", &[(6,6,1)], 0),
  ("TOT_TH0", &[(7,0,8)], 0),
  ("TOT_TH1", &[(8,0,8)], 0),
  ("TOT_TH2", &[(9,0,8)], 0),
  ("TOT_TH3", &[(10,0,8)], 0),
  ("TOT_P0", &[(11,0,7)], 0),
  ("TOT_P1", &[(12,0,7)], 0),
  ("TOT_P2", &[(13,0,7)], 0),
  ("TOT_P3", &[(14,0,7)], 0),
];

const TOP : &[ParameterSpec] = &[
  ("EN_LOCK_CONTROL", &[(0,0,1)], 1),
  ("ERROR_LIMIT_SC", &[(0,1,3)], 0b010),
  ("SEL_PLL_LOCKED", &[(0,4,1)], 1),
  ("PLLLOCKEDSC", &[(0,5,1)], 1),
  ("ORBITSYNC_SC", &[(0,7,1)], 0),
  ("EN_PLL", &[(1,0,1)], 1),
  ("DIV_PLL", &[(1,1,2)], 0),
  ("EN_HIGH_CAPA", &[(1,3,1)], 0),
  ("EN_REF_BG", &[(1,4,1)], 1),
  ("VOUT_INIT_EN", &[(1,5,1)], 0),
  ("VOUT_INIT_EXT_EN", &[(2,0,1)], 0),
  ("VOUT_INIT_EXT_D", &[(2,1,5)], 0),
  ("FOLLOWER_PLL_EN", &[(3,0,1)], 1),
  ("BIAS_I_PLL_D", &[(3,1,6)], 0b011000),
  ("SEL_40M_EXT", &[(3,7,1)], 0),
  ("PLL_PROBE_AMPLITUDE", &[(4,0,3)], 0b011),
  ("PLL_PROBE_PRE_SCALE", &[(4,3,3)], 0),
  ("PLL_PROBE_PRE_PHASE", &[(4,6,2)], 0),
  ("ET_AMPLITUDE", &[(5,0,3)], 0b011),
  ("ET_PRE_SCALE", &[(5,3,3)], 0),
  ("ET_PRE_PHASE", &[(5,6,2)], 0),
  ("SEL_RESYNC_FCMD", &[(6,0,1)], 1),
  ("SEL_L1_FCMD", &[(6,1,1)], 1),
  ("SEL_STROBE_FCMD", &[(6,2,1)], 1),
  ("SEL_ORBITSYNC_FCMD", &[(6,3,1)], 1),
  ("EN_PHASESHIFT", &[(7,0,1)], 1),
  ("PHASE", &[(7,1,4)], 0),
  ("EN_PLL_EXT", &[(7,7,1)], 0),
];

/// (page name, page id, kind of page)
const PAGES : &[(&str, u32, &str)] = &[
  ("GLOBAL_ANALOG_0", 297, "GLOBAL_ANALOG"),
  ("REFERENCE_VOLTAGE_0", 296, "REFERENCE_VOLTAGE"),
  ("MASTER_TDC_0", 298, "MASTER_TDC"),
  ("DIGITAL_HALF_0", 299, "DIGITAL_HALF"),
  ("REFERENCE_VOLTAGE_1", 40, "REFERENCE_VOLTAGE"),
  ("GLOBAL_ANALOG_1", 41, "GLOBAL_ANALOG"),
  ("MASTER_TDC_1", 42, "MASTER_TDC"),
  ("DIGITAL_HALF_1", 43, "DIGITAL_HALF"),
  ("TOP", 44, "TOP"),
  ("CM0", 275, "CHANNEL_WISE"),
  ("CM1", 276, "CHANNEL_WISE"),
  ("CALIB0", 274, "CHANNEL_WISE"),
  ("CM2", 19, "CHANNEL_WISE"),
  ("CM3", 20, "CHANNEL_WISE"),
  ("CALIB1", 18, "CHANNEL_WISE"),
  ("CHANNEL_0", 261, "CHANNEL_WISE"),
  ("CHANNEL_1", 260, "CHANNEL_WISE"),
  ("CHANNEL_2", 259, "CHANNEL_WISE"),
  ("CHANNEL_3", 258, "CHANNEL_WISE"),
  ("CHANNEL_4", 265, "CHANNEL_WISE"),
  ("CHANNEL_5", 264, "CHANNEL_WISE"),
  ("CHANNEL_6", 263, "CHANNEL_WISE"),
  ("CHANNEL_7", 262, "CHANNEL_WISE"),
  ("CHANNEL_8", 269, "CHANNEL_WISE"),
  ("CHANNEL_9", 268, "CHANNEL_WISE"),
  ("CHANNEL_10", 267, "CHANNEL_WISE"),
  ("CHANNEL_11", 266, "CHANNEL_WISE"),
  ("CHANNEL_12", 273, "CHANNEL_WISE"),
  ("CHANNEL_13", 272, "CHANNEL_WISE"),
  ("CHANNEL_14", 271, "CHANNEL_WISE"),
  ("CHANNEL_15", 270, "CHANNEL_WISE"),
  ("CHANNEL_16", 294, "CHANNEL_WISE"),
  ("CHANNEL_17", 256, "CHANNEL_WISE"),
  ("CHANNEL_18", 277, "CHANNEL_WISE"),
  ("CHANNEL_19", 295, "CHANNEL_WISE"),
  ("CHANNEL_20", 278, "CHANNEL_WISE"),
  ("CHANNEL_21", 279, "CHANNEL_WISE"),
  ("CHANNEL_22", 280, "CHANNEL_WISE"),
  ("CHANNEL_23", 281, "CHANNEL_WISE"),
  ("CHANNEL_24", 282, "CHANNEL_WISE"),
  ("CHANNEL_25", 283, "CHANNEL_WISE"),
  ("CHANNEL_26", 284, "CHANNEL_WISE"),
  ("CHANNEL_27", 285, "CHANNEL_WISE"),
  ("CHANNEL_28", 286, "CHANNEL_WISE"),
  ("CHANNEL_29", 287, "CHANNEL_WISE"),
  ("CHANNEL_30", 288, "CHANNEL_WISE"),
  ("CHANNEL_31", 289, "CHANNEL_WISE"),
  ("CHANNEL_32", 290, "CHANNEL_WISE"),
  ("CHANNEL_33", 291, "CHANNEL_WISE"),
  ("CHANNEL_34", 292, "CHANNEL_WISE"),
  ("CHANNEL_35", 293, "CHANNEL_WISE"),
  ("CHANNEL_36", 5, "CHANNEL_WISE"),
  ("CHANNEL_37", 4, "CHANNEL_WISE"),
  ("CHANNEL_38", 3, "CHANNEL_WISE"),
  ("CHANNEL_39", 2, "CHANNEL_WISE"),
  ("CHANNEL_40", 9, "CHANNEL_WISE"),
  ("CHANNEL_41", 8, "CHANNEL_WISE"),
  ("CHANNEL_42", 7, "CHANNEL_WISE"),
  ("CHANNEL_43", 6, "CHANNEL_WISE"),
  ("CHANNEL_44", 13, "CHANNEL_WISE"),
  ("CHANNEL_45", 12, "CHANNEL_WISE"),
  ("CHANNEL_46", 11, "CHANNEL_WISE"),
  ("CHANNEL_47", 10, "CHANNEL_WISE"),
  ("CHANNEL_48", 17, "CHANNEL_WISE"),
  ("CHANNEL_49", 16, "CHANNEL_WISE"),
  ("CHANNEL_50", 15, "CHANNEL_WISE"),
  ("CHANNEL_51", 14, "CHANNEL_WISE"),
  ("CHANNEL_52", 38, "CHANNEL_WISE"),
  ("CHANNEL_53", 0, "CHANNEL_WISE"),
  ("CHANNEL_54", 21, "CHANNEL_WISE"),
  ("CHANNEL_55", 39, "CHANNEL_WISE"),
  ("CHANNEL_56", 22, "CHANNEL_WISE"),
  ("CHANNEL_57", 23, "CHANNEL_WISE"),
  ("CHANNEL_58", 24, "CHANNEL_WISE"),
  ("CHANNEL_59", 25, "CHANNEL_WISE"),
  ("CHANNEL_60", 26, "CHANNEL_WISE"),
  ("CHANNEL_61", 27, "CHANNEL_WISE"),
  ("CHANNEL_62", 28, "CHANNEL_WISE"),
  ("CHANNEL_63", 29, "CHANNEL_WISE"),
  ("CHANNEL_64", 30, "CHANNEL_WISE"),
  ("CHANNEL_65", 31, "CHANNEL_WISE"),
  ("CHANNEL_66", 32, "CHANNEL_WISE"),
  ("CHANNEL_67", 33, "CHANNEL_WISE"),
  ("CHANNEL_68", 34, "CHANNEL_WISE"),
  ("CHANNEL_69", 35, "CHANNEL_WISE"),
  ("CHANNEL_70", 36, "CHANNEL_WISE"),
  ("CHANNEL_71", 37, "CHANNEL_WISE"),
];

const TABLES : [(&str, &[ParameterSpec]);6] = [
  ("GLOBAL_ANALOG"    , GLOBAL_ANALOG),
  ("REFERENCE_VOLTAGE", REFERENCE_VOLTAGE),
  ("MASTER_TDC"       , MASTER_TDC),
  ("CHANNEL_WISE"     , CHANNEL_WISE),
  ("DIGITAL_HALF"     , DIGITAL_HALF),
  ("TOP"              , TOP),
];

fn build_table(name : &str, specs : &[ParameterSpec]) -> Result<LookupTable, RegisterMapError> {
  let params = specs.iter().map(|(pname, locs, default)| {
    let locations : Vec<RegisterLocation> = locs.iter()
      .map(|(reg, min_bit, n_bits)| RegisterLocation::new(*reg, *min_bit, *n_bits))
      .collect();
    Parameter::spanning(pname, &locations, *default)
  }).collect();
  LookupTable::new(name, params)
}

/// Assemble the full map of the chip
pub fn build() -> Result<RegisterMap, RegisterMapError> {
  let mut tables = HashMap::<&str, Arc<LookupTable>>::new();
  for (name, specs) in TABLES {
    tables.insert(name, Arc::new(build_table(name, specs)?));
  }
  let mut map = RegisterMap::new();
  for (page, page_id, kind) in PAGES {
    match tables.get(kind) {
      Some(table) => map.add_page(page, *page_id, table.clone())?,
      None => {
        return Err(RegisterMapError::UnknownTable { table : String::from(*kind) });
      }
    }
  }
  debug!("Built HGCROC v2 register map with {} pages", map.len());
  Ok(map)
}

static REGISTER_MAP : OnceLock<Result<RegisterMap, RegisterMapError>> = OnceLock::new();

/// The process wide instance of the map, built on first use
pub fn register_map() -> Result<&'static RegisterMap, RegisterMapError> {
  REGISTER_MAP.get_or_init(build).as_ref().map_err(|err| err.clone())
}

#[cfg(test)]
mod test_sipm_rocv2 {
  use super::*;

  #[test]
  fn every_page_is_there() {
    let map = register_map().unwrap();
    // 2 halves x 4 global pages, top, 4 cm, 2 calib, 72 channels
    assert_eq!(map.len(), 8 + 1 + 4 + 2 + 72);
    assert_eq!(map.matching_pages("CHANNEL_*").len(), 72);
    assert_eq!(map.page("channel_53").map(|(id, _)| id), Some(0));
    assert_eq!(map.page("DIGITAL_HALF_0").map(|(id, _)| id), Some(299));
    assert_eq!(map.page_name(44), Some("TOP"));
  }

  #[test]
  fn spread_parameters() {
    let map = register_map().unwrap();
    let (_, table) = map.page("CHANNEL_0").unwrap();
    let dacb = table.get("dacb").unwrap();
    assert_eq!(dacb.total_bits(), 6);
    assert_eq!(dacb.locations[0], RegisterLocation::new(2, 6, 2));
    let (_, table) = map.page("DIGITAL_HALF_1").unwrap();
    let idle = table.get("IDLEFRAME").unwrap();
    assert_eq!(idle.total_bits(), 28);
    assert_eq!(idle.default, 0xCCCCCCC);
  }

  #[test]
  fn defaults_cover_all_pages() {
    let map = register_map().unwrap();
    let defaults = map.defaults();
    assert_eq!(defaults.len(), map.len());
    assert_eq!(defaults["GLOBAL_ANALOG_0"]["GAIN_CONV"], 0b0100);
    assert_eq!(defaults["TOP"]["BIAS_I_PLL_D"], 0b011000);
  }
}
