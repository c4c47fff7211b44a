#[cfg(test)]
pub mod tests {

  extern crate rand;
  use rand::Rng;
  use std::collections::BTreeMap;

  use pf_dataclasses::FromRandom;
  use pf_dataclasses::decoding::{
    decode,
    SuperPacket,
  };

  use pflib::compile::{
    self,
    CompileError,
    PageSettings,
  };
  use pflib::daq::{
    EVENT_BUFFER_BASE,
    REG_STATUS,
  };
  use pflib::register_maps::{
    sipm_rocv2,
    RegisterMap,
    PAGE_REGISTERS,
  };
  use pflib::simulated::{
    Fault,
    SimulatedWishbone,
  };
  use pflib::{
    DetectorConfiguration,
    PolarfireTarget,
    RegisterSnapshot,
    Roc,
    TargetRouter,
    WishboneTarget,
  };

  /// A random (page, parameter, value) of the map
  fn random_setting(map : &RegisterMap) -> (String, String, u32) {
    let mut rng  = rand::thread_rng();
    let pages : Vec<_> = map.pages().collect();
    let (page, _, table) = pages[rng.gen_range(0..pages.len())];
    let params : Vec<_>  = table.parameters().collect();
    let param = params[rng.gen_range(0..params.len())];
    let value = rng.gen_range(1..=param.max_value());
    (String::from(page), param.name.clone(), value)
  }

  #[test]
  fn random_parameter_leaves_its_neighbours_alone() {
    let mut rng = rand::thread_rng();
    let roc = Roc::new(1).unwrap();
    let map = roc.register_map();
    for _ in 0..50 {
      let (page, name, value) = random_setting(map);
      let (page_id, _) = map.page(&page).unwrap();
      let mut bus = SimulatedWishbone::new();
      for reg in 0..PAGE_REGISTERS {
        let addr = WishboneTarget::I2c.base() + roc.scope.local(page_id, reg);
        bus.preset(addr, rng.gen::<u32>());
      }
      let mut router = TargetRouter::new(&mut bus);
      let before = compile::decompile(&mut router, &mut RegisterSnapshot::new(), &roc.scope, map, &[page.as_str()]).unwrap();
      let mut snapshot = RegisterSnapshot::new();
      roc.apply_parameter(&mut router, &mut snapshot, &page, &name, value).unwrap();
      let after = compile::decompile(&mut router, &mut RegisterSnapshot::new(), &roc.scope, map, &[page.as_str()]).unwrap();
      for (param, old) in &before[&page] {
        if *param == name {
          assert_eq!(after[&page][param], value, "{}.{}", page, param);
        } else {
          assert_eq!(after[&page][param], *old, "{}.{} changed while setting {}", page, param, name);
        }
      }
    }
  }

  #[test]
  fn random_write_fault_converges_on_retry() {
    let mut rng = rand::thread_rng();
    let roc = Roc::new(0).unwrap();
    let map = roc.register_map();
    for _ in 0..20 {
      let mut settings = PageSettings::new();
      for _ in 0..rng.gen_range(2..12) {
        let (page, name, value) = random_setting(map);
        settings.entry(page).or_default().insert(name, value);
      }
      let mut bus = SimulatedWishbone::new();
      let planned = {
        let mut router = TargetRouter::new(&mut bus);
        roc.plan_parameters(&mut router, &mut RegisterSnapshot::new(), &settings).unwrap()
      };
      assert_eq!(bus.n_writes, 0);
      let ifail   = rng.gen_range(0..planned.n_writes());
      let failing = planned.writes[ifail];
      let addr    = WishboneTarget::I2c.base() + roc.scope.local(failing.page, failing.register);
      bus.inject(Fault::WriteTo(addr, pflib::BusError::Nack));

      let mut snapshot = RegisterSnapshot::new();
      let mut router   = TargetRouter::new(&mut bus);
      match roc.apply_parameters(&mut router, &mut snapshot, &settings) {
        Err(CompileError::CommitError { page, register, applied, .. }) => {
          assert_eq!((page, register, applied), (failing.page, failing.register, ifail));
        }
        other => panic!("Expected a CommitError, got {:?}", other),
      }
      let retry = roc.apply_parameters(&mut router, &mut snapshot, &settings).unwrap();
      assert_eq!(retry.n_writes(), planned.n_writes() - ifail);
      let again = roc.apply_parameters(&mut router, &mut snapshot, &settings).unwrap();
      assert!(again.is_empty());
      let patterns : Vec<&str> = settings.keys().map(|k| k.as_str()).collect();
      let dumped = compile::decompile(&mut router, &mut RegisterSnapshot::new(), &roc.scope, map, &patterns).unwrap();
      for (page, params) in &settings {
        for (name, value) in params {
          assert_eq!(dumped[page][name], *value);
        }
      }
    }
  }

  #[test]
  fn random_settings_through_registers() {
    let map = sipm_rocv2::register_map().unwrap();
    for _ in 0..20 {
      let mut settings = PageSettings::new();
      for _ in 0..10 {
        let (page, name, value) = random_setting(map);
        settings.entry(page).or_default().insert(name, value);
      }
      let registers = compile::compile_registers(&settings, map).unwrap();
      let back = compile::decompile_registers(&registers, map, true).unwrap();
      for (page, params) in &settings {
        for (name, value) in params {
          assert_eq!(back[page][name], *value, "{}.{}", page, name);
        }
      }
    }
  }

  #[test]
  fn random_events_through_the_daq() {
    for _ in 0..20 {
      let event = SuperPacket::from_random();
      let words = event.to_words();
      let mut bus = SimulatedWishbone::new();
      bus.preset(WishboneTarget::DaqControl.base() + REG_STATUS, ((words.len() as u32) << 16) | (1 << 4));
      for (k, w) in words.iter().enumerate() {
        bus.preset(WishboneTarget::DaqOutbuffer.base() + EVENT_BUFFER_BASE + k as u32, *w);
      }
      let mut target = PolarfireTarget::new(Box::new(bus), &[0]).unwrap();
      let status = target.daq_status().unwrap();
      assert_eq!(status.next_event_size as usize, words.len());
      let stream = target.read_event().unwrap().unwrap();
      let decoded = decode(&stream).unwrap();
      assert_eq!(decoded, event);
    }
  }

  #[test]
  fn random_configuration_values() {
    let mut rng = rand::thread_rng();
    let map = sipm_rocv2::register_map().unwrap();
    for _ in 0..20 {
      let mut expected = PageSettings::new();
      let mut reprs    = BTreeMap::<String, BTreeMap<String, String>>::new();
      for _ in 0..5 {
        let (page, name, value) = random_setting(map);
        let repr = match rng.gen_range(0..3) {
          0 => format!("{}", value),
          1 => format!("\"{:#x}\"", value),
          _ => format!("\"{}\"", value),
        };
        expected.entry(page.clone()).or_default().insert(name.clone(), value);
        reprs.entry(page).or_default().insert(name, repr);
      }
      let mut toml_string = String::new();
      for (page, params) in &reprs {
        toml_string += &format!("[pf.hgcrocs.0.{}]\n", page.to_lowercase());
        for (name, repr) in params {
          toml_string += &format!("{} = {}\n", name.to_lowercase(), repr);
        }
      }
      let config = DetectorConfiguration::from_toml_str(&toml_string).unwrap();
      assert_eq!(config.polarfire("pf").unwrap().hgcrocs[&0], expected);
    }
  }
}
