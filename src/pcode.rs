use num_derive::FromPrimitive;

/// The instruction set of the ACS virtual machine.
///
/// **NOTE:** The numeric value of every member is fixed by the target
/// engine. Members must never be reordered, and new members only go at
/// the end; anchor values are spelled out at the start of each engine
/// extension block so an accidental insertion fails to compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(i32)]
pub enum Pcode {
  Nop = 0,
  Terminate,
  Suspend,
  PushNumber,
  Lspec1,
  Lspec2,
  Lspec3,
  Lspec4,
  Lspec5,
  Lspec1Direct,
  Lspec2Direct,
  Lspec3Direct,
  Lspec4Direct,
  Lspec5Direct,
  Add,
  Subtract,
  Multiply,
  Divide,
  Modulus,
  Eq,
  Ne,
  Lt,
  Gt,
  Le,
  Ge,
  AssignScriptVar,
  AssignMapVar,
  AssignWorldVar,
  PushScriptVar,
  PushMapVar,
  PushWorldVar,
  AddScriptVar,
  AddMapVar,
  AddWorldVar,
  SubScriptVar,
  SubMapVar,
  SubWorldVar,
  MulScriptVar,
  MulMapVar,
  MulWorldVar,
  DivScriptVar,
  DivMapVar,
  DivWorldVar,
  ModScriptVar,
  ModMapVar,
  ModWorldVar,
  IncScriptVar,
  IncMapVar,
  IncWorldVar,
  DecScriptVar,
  DecMapVar,
  DecWorldVar,
  Goto,
  IfGoto,
  Drop,
  Delay,
  DelayDirect,
  Random,
  RandomDirect,
  ThingCount,
  ThingCountDirect,
  TagWait,
  TagWaitDirect,
  PolyWait,
  PolyWaitDirect,
  ChangeFloor,
  ChangeFloorDirect,
  ChangeCeiling,
  ChangeCeilingDirect,
  Restart,
  AndLogical,
  OrLogical,
  AndBitwise,
  OrBitwise,
  EorBitwise,
  NegateLogical,
  Lshift,
  Rshift,
  UnaryMinus,
  IfNotGoto,
  LineSide,
  ScriptWait,
  ScriptWaitDirect,
  ClearLineSpecial,
  CaseGoto,
  BeginPrint,
  EndPrint,
  PrintString,
  PrintNumber,
  PrintCharacter,
  PlayerCount,
  GameType,
  GameSkill,
  Timer,
  SectorSound,
  AmbientSound,
  SoundSequence,
  SetLineTexture,
  SetLineBlocking,
  SetLineSpecial,
  ThingSound,
  EndPrintBold,
  // The instructions above are the base set; everything below is an
  // engine extension.
  ActivatorSound,
  LocalAmbientSound,
  SetLineMonsterBlocking,
  PlayerBlueSkull = 105,
  PlayerRedSkull,
  PlayerYellowSkull,
  PlayerMasterSkull,
  PlayerBlueCard,
  PlayerRedCard,
  PlayerYellowCard,
  PlayerMasterCard,
  PlayerBlackSkull,
  PlayerSilverSkull,
  PlayerGoldSkull,
  PlayerBlackCard,
  PlayerSilverCard,
  IsMultiplayer,
  PlayerTeam,
  PlayerHealth,
  PlayerArmorPoints,
  PlayerFrags,
  PlayerExpert,
  BlueTeamCount,
  RedTeamCount,
  BlueTeamScore,
  RedTeamScore,
  IsOneFlagCtf,
  GetInvasionWave,
  GetInvasionState,
  PrintName,
  MusicChange,
  ConsoleCommandDirect,
  ConsoleCommand,
  SinglePlayer,
  FixedMul = 136,
  FixedDiv,
  SetGravity,
  SetGravityDirect,
  SetAirControl,
  SetAirControlDirect,
  ClearInventory,
  GiveInventory,
  GiveInventoryDirect,
  TakeInventory,
  TakeInventoryDirect,
  CheckInventory,
  CheckInventoryDirect,
  Spawn,
  SpawnDirect,
  SpawnSpot,
  SpawnSpotDirect,
  SetMusic,
  SetMusicDirect,
  LocalSetMusic,
  LocalSetMusicDirect,
  PrintFixed,
  PrintLocalized,
  MoreHudMessage,
  OptHudMessage,
  EndHudMessage,
  EndHudMessageBold,
  SetStyle,
  SetStyleDirect,
  SetFont,
  SetFontDirect,
  // Byte-sized instruction forms, available in the compressed format.
  PushByte = 167,
  Lspec1DirectB,
  Lspec2DirectB,
  Lspec3DirectB,
  Lspec4DirectB,
  Lspec5DirectB,
  DelayDirectB,
  RandomDirectB,
  PushBytes,
  Push2Bytes,
  Push3Bytes,
  Push4Bytes,
  Push5Bytes,
  SetThingSpecial = 180,
  AssignGlobalVar,
  PushGlobalVar,
  AddGlobalVar,
  SubGlobalVar,
  MulGlobalVar,
  DivGlobalVar,
  ModGlobalVar,
  IncGlobalVar,
  DecGlobalVar,
  FadeTo,
  FadeRange,
  CancelFade,
  PlayMovie,
  SetFloorTrigger,
  SetCeilingTrigger,
  GetActorX,
  GetActorY,
  GetActorZ,
  StartTranslation,
  TranslationRange1,
  TranslationRange2,
  EndTranslation,
  Call = 203,
  CallDiscard,
  ReturnVoid,
  ReturnVal,
  PushMapArray,
  AssignMapArray,
  AddMapArray,
  SubMapArray,
  MulMapArray,
  DivMapArray,
  ModMapArray,
  IncMapArray,
  DecMapArray,
  Dup,
  Swap,
  WriteToIni,
  GetFromIni,
  Sin,
  Cos,
  VectorAngle,
  CheckWeapon,
  SetWeapon,
  TagString,
  PushWorldArray = 226,
  AssignWorldArray,
  AddWorldArray,
  SubWorldArray,
  MulWorldArray,
  DivWorldArray,
  ModWorldArray,
  IncWorldArray,
  DecWorldArray,
  PushGlobalArray = 235,
  AssignGlobalArray,
  AddGlobalArray,
  SubGlobalArray,
  MulGlobalArray,
  DivGlobalArray,
  ModGlobalArray,
  IncGlobalArray,
  DecGlobalArray,
  SetMarineWeapon = 244,
  SetActorProperty,
  GetActorProperty,
  PlayerNumber,
  ActivatorTid,
  SetMarineSprite,
  GetScreenWidth,
  GetScreenHeight,
  ThingProjectile2,
  StrLen,
  SetHudSize,
  GetCvar,
  CaseGotoSorted = 256,
  SetResultValue,
  GetLineRowOffset,
  GetActorFloorZ,
  GetActorAngle,
  GetSectorFloorZ,
  GetSectorCeilingZ,
  Lspec5Result,
  GetSigilPieces,
  GetLevelInfo,
  ChangeSky,
  PlayerInGame,
  PlayerIsBot,
  SetCameraToTexture,
  EndLog,
  GetAmmoCapacity,
  SetAmmoCapacity,
  PrintMapCharArray,
  PrintWorldCharArray,
  PrintGlobalCharArray,
  SetActorAngle,
  GrabInput,
  SetMousePointer,
  MoveMousePointer,
  SpawnProjectile,
  GetSectorLightLevel,
  GetActorCeilingZ,
  SetActorPosition,
  ClearActorInventory,
  GiveActorInventory,
  TakeActorInventory,
  CheckActorInventory,
  ThingCountName,
  SpawnSpotFacing,
  PlayerClass,
  AndScriptVar = 291,
  AndMapVar,
  AndWorldVar,
  AndGlobalVar,
  AndMapArray,
  AndWorldArray,
  AndGlobalArray,
  EorScriptVar,
  EorMapVar,
  EorWorldVar,
  EorGlobalVar,
  EorMapArray,
  EorWorldArray,
  EorGlobalArray,
  OrScriptVar,
  OrMapVar,
  OrWorldVar,
  OrGlobalVar,
  OrMapArray,
  OrWorldArray,
  OrGlobalArray,
  LsScriptVar,
  LsMapVar,
  LsWorldVar,
  LsGlobalVar,
  LsMapArray,
  LsWorldArray,
  LsGlobalArray,
  RsScriptVar,
  RsMapVar,
  RsWorldVar,
  RsGlobalVar,
  RsMapArray,
  RsWorldArray,
  RsGlobalArray,
  GetPlayerInfo = 326,
  ChangeLevel,
  SectorDamage,
  ReplaceTextures,
  NegateBinary,
  GetActorPitch,
  SetActorPitch,
  PrintBind,
  SetActorState,
  ThingDamage2,
  UseInventory,
  UseActorInventory,
  CheckActorCeilingTexture,
  CheckActorFloorTexture,
  GetActorLightLevel,
  SetMugshotState,
  ThingCountSector,
  ThingCountNameSector,
  CheckPlayerCamera,
  MorphActor,
  UnmorphActor,
  GetPlayerInput,
  ClassifyActor,
  PrintBinary,
  PrintHex,
  CallFunc = 351,
  SaveString,
  PrintMapChRange,
  PrintWorldChRange,
  PrintGlobalChRange,
  StrcpyToMapChRange,
  StrcpyToWorldChRange,
  StrcpyToGlobalChRange,
  PushFunction,
  CallStack,
  ScriptWaitNamed,
  TranslationRange3,
  GotoStack,
  AssignScriptArray = 364,
  PushScriptArray,
  AddScriptArray,
  SubScriptArray,
  MulScriptArray,
  DivScriptArray,
  ModScriptArray,
  IncScriptArray,
  DecScriptArray,
  AndScriptArray,
  EorScriptArray,
  OrScriptArray,
  LsScriptArray,
  RsScriptArray,
  PrintScriptCharArray,
  PrintScriptChRange,
  StrcpyToScriptChRange,
}

impl From<Pcode> for i32 {
  fn from(code: Pcode) -> i32 {
    code as i32
  }
}
